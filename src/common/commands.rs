/// Commands the front-end sends down to the sync session.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    SendMessage(String),
    /// Poll now instead of waiting for the next tick.
    Refresh,
    /// Run one cleanup sweep now.
    Sweep,
    Shutdown,
}
