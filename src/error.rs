use thiserror::Error;

/// Failures reported by a storage backend for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("rate limited by backend (HTTP {0})")]
    RateLimited(u16),
    /// Connection-level failure with no response. Some backends mask rate
    /// limiting this way, so it is treated as transient.
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether the governor should back off and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::RateLimited(_) | StoreError::Network(_))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("operation `{operation}` failed after {attempts} attempts: {source}")]
    OperationFailed {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request governor has shut down")]
    GovernorClosed,
    #[error("message {id} was not committed after {attempts} attempts")]
    SendFailed { id: String, attempts: u32 },
}

impl SyncError {
    /// Id of the lost message, when this error is a send that ran out of
    /// attempts.
    pub fn lost_message_id(&self) -> Option<&str> {
        match self {
            SyncError::SendFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}
