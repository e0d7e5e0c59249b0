pub mod cleanup;
pub mod engine;
pub mod governor;
pub mod protocol;
pub mod session;

pub use cleanup::{CleanupSweeper, SweepOutcome};
pub use engine::{EngineConfig, SendReceipt, SyncEngine};
pub use governor::{GovernorConfig, RequestGovernor, RetryPolicy};
pub use session::{ChatSession, SessionTimers};
