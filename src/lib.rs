pub mod common;
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;
pub mod ui;

pub use error::{StoreError, SyncError};
