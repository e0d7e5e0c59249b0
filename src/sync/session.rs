use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::common::{StoredMessage, SyncCommand, SyncEvent};
use crate::config::AppConfig;

use super::cleanup::CleanupSweeper;
use super::engine::SyncEngine;

const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct SessionTimers {
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
}

impl SessionTimers {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            cleanup_interval: config.cleanup_interval(),
        }
    }
}

/// Drives one conversation: polls on a timer (and once at start), sweeps on
/// its own timer, and runs sends as they arrive. All three talk to the
/// engine only through its public operations.
pub struct ChatSession {
    engine: Arc<SyncEngine>,
    sweeper: CleanupSweeper,
    timers: SessionTimers,
    event_sender: mpsc::Sender<SyncEvent>,
    command_receiver: mpsc::Receiver<SyncCommand>,
}

impl ChatSession {
    pub fn new(
        engine: Arc<SyncEngine>,
        timers: SessionTimers,
        event_sender: mpsc::Sender<SyncEvent>,
        command_receiver: mpsc::Receiver<SyncCommand>,
    ) -> Self {
        let sweeper = CleanupSweeper::new(engine.config().max_visible_lines);
        Self {
            engine,
            sweeper,
            timers,
            event_sender,
            command_receiver,
        }
    }

    /// Runs until `Shutdown` arrives or the command channel closes. Timers
    /// are stopped on exit; in-flight sends finish on their own and their
    /// events are dropped if nobody is listening.
    pub async fn run(mut self) {
        let poller = self.spawn_poller();
        let cleaner = self.spawn_cleaner();
        log::info!("Sync session started for `{}`", self.engine.username());

        while let Some(command) = self.command_receiver.recv().await {
            match command {
                SyncCommand::SendMessage(text) => self.spawn_send(text),
                SyncCommand::Refresh => {
                    let engine = Arc::clone(&self.engine);
                    let events = self.event_sender.clone();
                    tokio::spawn(async move { poll_once(&engine, &events).await });
                }
                SyncCommand::Sweep => {
                    let engine = Arc::clone(&self.engine);
                    let events = self.event_sender.clone();
                    let sweeper = self.sweeper;
                    tokio::spawn(async move { sweep_once(&sweeper, &engine, &events).await });
                }
                SyncCommand::Shutdown => break,
            }
        }

        poller.abort();
        cleaner.abort();
        log::info!("Sync session stopped");
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let events = self.event_sender.clone();
        let period = self.timers.poll_interval.max(MIN_TICK);
        tokio::spawn(async move {
            // The first tick fires immediately.
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poll_once(&engine, &events).await;
            }
        })
    }

    fn spawn_cleaner(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let events = self.event_sender.clone();
        let sweeper = self.sweeper;
        let period = self.timers.cleanup_interval.max(MIN_TICK);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweep_once(&sweeper, &engine, &events).await;
            }
        })
    }

    /// Reports `SendStarted` before the send queues on the engine, then
    /// exactly one of `SendCommitted` or `SendFailed` for the same id.
    fn spawn_send(&self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let message = StoredMessage::new(&text);
        let engine = Arc::clone(&self.engine);
        let events = self.event_sender.clone();
        tokio::spawn(async move {
            let id = message.id.clone();
            notify(&events, SyncEvent::SendStarted(id.clone())).await;
            let event = match engine.send_stored(message).await {
                Ok(receipt) => SyncEvent::SendCommitted {
                    id,
                    attempts: receipt.attempts,
                },
                Err(err) => {
                    if err.lost_message_id().is_some() {
                        log::error!("Gave up on message {id}: {err}");
                    } else {
                        log::error!("Failed to send message {id}: {err}");
                    }
                    SyncEvent::SendFailed {
                        id,
                        reason: err.to_string(),
                    }
                }
            };
            notify(&events, event).await;
        });
    }
}

async fn poll_once(engine: &SyncEngine, events: &mpsc::Sender<SyncEvent>) {
    let event = match engine.fetch().await {
        Ok(lines) => SyncEvent::MirrorUpdated(lines),
        Err(err) => SyncEvent::FetchFailed(err.to_string()),
    };
    notify(events, event).await;
}

async fn sweep_once(
    sweeper: &CleanupSweeper,
    engine: &SyncEngine,
    events: &mpsc::Sender<SyncEvent>,
) {
    match sweeper.sweep(engine).await {
        Ok(outcome) if outcome.removed() > 0 => {
            notify(
                events,
                SyncEvent::Swept {
                    removed: outcome.removed(),
                },
            )
            .await;
        }
        Ok(_) => {}
        Err(err) => log::warn!("Cleanup sweep failed: {err}"),
    }
}

async fn notify(events: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    if let Err(err) = events.send(event).await {
        log::debug!("Dropping sync event, front-end is gone: {err}");
    }
}
