pub mod database;
pub mod http;
pub mod memory;

pub use database::SqliteStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::common::Document;
use crate::config::{AppConfig, BackendKind};
use crate::error::StoreError;

/// Whole-document access to the shared log. Backends offer no atomic
/// read-modify-write and no change notification.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the document does not exist yet.
    async fn read(&self) -> Result<Option<Document>, StoreError>;

    /// Overwrites the whole document.
    async fn write(&self, document: &Document) -> Result<(), StoreError>;
}

/// Builds the backend selected in the config.
pub fn build_store(config: &AppConfig) -> Result<Arc<dyn RemoteStore>, StoreError> {
    match config.backend {
        BackendKind::Http => Ok(Arc::new(HttpStore::from_config(&config.http)?)),
        BackendKind::Sqlite => {
            ensure_parent_dir(&config.sqlite.path)
                .map_err(|err| StoreError::Storage(err.to_string()))?;
            Ok(Arc::new(SqliteStore::open(
                &config.sqlite.path,
                &config.sqlite.document,
            )?))
        }
        BackendKind::Memory => Ok(MemoryStore::new()),
    }
}

/// Ensure the directory holding `path` exists
pub fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
