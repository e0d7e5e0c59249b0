use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock};

use crate::common::{ChatMessage, DisplayLine, Document, StoredMessage};
use crate::config::AppConfig;
use crate::error::SyncError;
use crate::storage::RemoteStore;
use crate::ui::colors::color_for_username;
use crate::ui::projector::project;

use super::governor::{GovernorConfig, RequestGovernor};
use super::protocol::{AfterRead, AfterVerify, AppendProtocol};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub username: String,
    pub max_visible_lines: usize,
    /// Most messages kept in the mirror; 0 keeps everything.
    pub storage_buffer_size: usize,
    pub send_max_attempts: u32,
}

impl EngineConfig {
    pub fn new(username: impl Into<String>) -> Self {
        let defaults = AppConfig::default();
        Self {
            username: username.into(),
            max_visible_lines: defaults.max_visible_lines,
            storage_buffer_size: defaults.storage_buffer_size,
            send_max_attempts: defaults.send_max_attempts,
        }
    }

    pub fn from_app(config: &AppConfig, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            max_visible_lines: config.max_visible_lines,
            storage_buffer_size: config.storage_buffer_size,
            send_max_attempts: config.send_max_attempts,
        }
    }
}

/// A send that made it into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message: StoredMessage,
    pub attempts: u32,
}

/// Owns the local mirror of the shared log and runs the read and append
/// protocols. Every backend call goes through the engine's governor.
///
/// Sends from one engine run one at a time: a send's read, write and verify
/// never interleave with another local send.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    governor: RequestGovernor,
    config: EngineConfig,
    mirror: RwLock<Vec<ChatMessage>>,
    send_lock: Mutex<()>,
    sending: AtomicUsize,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, governor: RequestGovernor, config: EngineConfig) -> Self {
        Self {
            store,
            governor,
            config,
            mirror: RwLock::new(Vec::new()),
            send_lock: Mutex::new(()),
            sending: AtomicUsize::new(0),
        }
    }

    /// Engine wired from the application config. Needs a tokio runtime.
    pub fn from_app(store: Arc<dyn RemoteStore>, config: &AppConfig, username: &str) -> Self {
        Self::new(
            store,
            RequestGovernor::new(GovernorConfig::from_app(config)),
            EngineConfig::from_app(config, username),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn my_color(&self) -> &'static str {
        color_for_username(&self.config.username)
    }

    /// Whether any send is queued or between its first read and its outcome.
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst) > 0
    }

    pub async fn mirror(&self) -> Vec<ChatMessage> {
        self.mirror.read().await.clone()
    }

    pub async fn display_lines(&self) -> Vec<DisplayLine> {
        project(&self.mirror.read().await, self.config.max_visible_lines)
    }

    /// Governed read; an absent document is an empty one.
    pub(crate) async fn read_document(&self, operation: &'static str) -> Result<Document, SyncError> {
        let store = Arc::clone(&self.store);
        let document = self
            .governor
            .schedule(operation, move || {
                let store = Arc::clone(&store);
                async move { store.read().await }
            })
            .await?;
        Ok(document.unwrap_or_default())
    }

    /// Governed whole-document overwrite.
    pub(crate) async fn write_document(
        &self,
        operation: &'static str,
        document: Document,
    ) -> Result<(), SyncError> {
        let store = Arc::clone(&self.store);
        self.governor
            .schedule(operation, move || {
                let store = Arc::clone(&store);
                let document = document.clone();
                async move { store.write(&document).await }
            })
            .await
    }

    /// Rebuilds the mirror from a fresh snapshot and returns the projected
    /// window. On failure the previous mirror is kept.
    pub async fn fetch(&self) -> Result<Vec<DisplayLine>, SyncError> {
        let document = match self.read_document("fetch").await {
            Ok(document) => document,
            Err(err) => {
                log::warn!("Fetch failed, keeping previous mirror: {err}");
                return Err(err);
            }
        };

        let mut flattened = document.flatten();
        let cap = self.config.storage_buffer_size;
        if cap > 0 && flattened.len() > cap {
            flattened.drain(..flattened.len() - cap);
        }
        log::debug!("Fetched {} messages", flattened.len());

        let lines = project(&flattened, self.config.max_visible_lines);
        *self.mirror.write().await = flattened;
        Ok(lines)
    }

    /// Appends `text` as a new message from this writer. Blank text is a
    /// no-op and yields `Ok(None)`.
    pub async fn send_message(&self, text: &str) -> Result<Option<SendReceipt>, SyncError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.send_stored(StoredMessage::new(text)).await.map(Some)
    }

    /// Runs the append protocol for an already-built message. Sending the
    /// same message twice never stores it twice. Concurrent calls queue
    /// behind each other.
    pub async fn send_stored(&self, message: StoredMessage) -> Result<SendReceipt, SyncError> {
        let _sending = SendingGuard::enter(&self.sending);
        let _turn = self.send_lock.lock().await;
        let mut protocol =
            AppendProtocol::new(&self.config.username, message, self.config.send_max_attempts);

        loop {
            let snapshot = self.read_document("send.read").await?;
            match protocol.after_read(&snapshot) {
                AfterRead::Write(next) => self.write_document("send.write", next).await?,
                AfterRead::AlreadyStored => {
                    log::debug!(
                        "Message {} already stored, skipping write",
                        protocol.message().id
                    );
                }
            }

            let check = self.read_document("send.verify").await?;
            match protocol.after_verify(&check) {
                AfterVerify::Committed { attempts } => {
                    log::info!("Message {} committed", protocol.message().id);
                    return Ok(SendReceipt {
                        message: protocol.message().clone(),
                        attempts,
                    });
                }
                AfterVerify::Retry { attempt } => {
                    log::warn!(
                        "Write conflict detected (attempt {}/{}), retrying",
                        attempt - 1,
                        protocol.max_attempts()
                    );
                }
                AfterVerify::GaveUp { attempts } => {
                    log::error!(
                        "Message {} lost after {attempts} attempts",
                        protocol.message().id
                    );
                    return Err(SyncError::SendFailed {
                        id: protocol.message().id.clone(),
                        attempts,
                    });
                }
            }
        }
    }
}

struct SendingGuard<'a>(&'a AtomicUsize);

impl<'a> SendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
