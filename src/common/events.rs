use crate::common::types::DisplayLine;

/// Events the sync session reports up to the front-end.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The mirror was rebuilt; carries the projected window.
    MirrorUpdated(Vec<DisplayLine>),
    /// A send was accepted and queued; carries the new message id.
    SendStarted(String),
    SendCommitted { id: String, attempts: u32 },
    /// The message was not durably written and will not be retried.
    SendFailed { id: String, reason: String },
    FetchFailed(String),
    Swept { removed: usize },
}
