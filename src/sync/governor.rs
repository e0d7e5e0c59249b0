//! Serializing, rate-limiting dispatcher in front of every backend call.
//!
//! Operations are started strictly in submission order, one at a time, each
//! start at least `min_interval` after the previous one. Every operation runs
//! under its own backoff loop for transient failures; a terminal failure
//! affects only that operation and the queue keeps draining.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::config::AppConfig;
use crate::error::{StoreError, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GovernorConfig {
    pub min_interval: Duration,
    pub retry: RetryPolicy,
}

impl GovernorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            min_interval: config.min_request_interval(),
            retry: RetryPolicy {
                max_attempts: config.retry_max_attempts,
                initial_delay: config.retry_initial_delay(),
            },
        }
    }
}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Owned FIFO queue of backend operations. Must be created inside a tokio
/// runtime; the worker task ends once the governor is dropped and the queue
/// is drained.
pub struct RequestGovernor {
    jobs: mpsc::UnboundedSender<Job>,
    retry: RetryPolicy,
}

impl RequestGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        tokio::spawn(drain(queue, config.min_interval));
        Self {
            jobs,
            retry: config.retry,
        }
    }

    /// Queues `call` and resolves with its result once it has run. `call` may
    /// be invoked several times if the backend signals a rate limit.
    pub async fn schedule<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let retry = self.retry;
        let job: Job = Box::new(move || {
            async move {
                let result = with_retry(operation, retry, call).await;
                // The caller may have gone away; the result is then discarded.
                let _ = reply.send(result);
            }
            .boxed()
        });

        self.jobs.send(job).map_err(|_| SyncError::GovernorClosed)?;
        response.await.map_err(|_| SyncError::GovernorClosed)?
    }
}

async fn drain(mut queue: mpsc::UnboundedReceiver<Job>, min_interval: Duration) {
    let mut last_start: Option<Instant> = None;
    while let Some(job) = queue.recv().await {
        if let Some(last) = last_start {
            time::sleep_until(last + min_interval).await;
        }
        last_start = Some(Instant::now());
        job().await;
    }
    log::debug!("Request governor queue closed");
}

async fn with_retry<T, F, Fut>(
    operation: &'static str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= attempts {
                    log::error!("`{operation}` failed after {attempts} attempts: {err}");
                    return Err(SyncError::OperationFailed {
                        operation,
                        attempts,
                        source: err,
                    });
                }
                log::warn!(
                    "`{operation}` hit {err}; waiting {}ms before retry {}/{attempts}",
                    delay.as_millis(),
                    attempt + 1
                );
                time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(SyncError::Store(err)),
        }
    }
}
