// ABOUTME: The one fixed-interval poll routine shared by every lifecycle caller
// ABOUTME: Retries transient failures until a terminal value, the deadline, or cancellation

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.poll_interval(), config.timeout())
    }
}

#[derive(Debug)]
pub enum PollOutcome<T> {
    Terminal(T),
    /// The deadline passed. `last` is the most recent non-terminal observation.
    TimedOut { last: Option<T>, attempts: u32 },
    Cancelled { last: Option<T> },
}

/// Call `query` every `options.interval` until `is_terminal` accepts a value.
///
/// Only transient errors are retried; anything else is returned immediately.
/// A single query that hangs is cut off at the remaining budget, so the call
/// never outlives `options.timeout` by more than scheduling jitter.
pub async fn poll_until<T, F, Fut, P>(
    options: PollOptions,
    cancel: &CancellationToken,
    mut query: F,
    is_terminal: P,
) -> Result<PollOutcome<T>, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + options.timeout;
    let mut last = None;
    let mut attempts = 0u32;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut { last, attempts });
        }
        attempts += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled { last }),
            result = tokio::time::timeout(deadline - now, query()) => result,
        };

        match result {
            Ok(Ok(value)) if is_terminal(&value) => return Ok(PollOutcome::Terminal(value)),
            Ok(Ok(value)) => last = Some(value),
            Ok(Err(err)) if err.is_transient() => {
                tracing::warn!(attempt = attempts, error = %err, "Transient poll failure, retrying");
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                tracing::debug!(attempt = attempts, "Status query outlived the wait budget");
                continue;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            continue;
        }
        let pause = options.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled { last }),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
