use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RelayError;

/// Attempt budget and the waits applied between successive attempts.
///
/// Attempt `k`'s backoff is `backoff[min(k - 1, len - 1)]`: once attempts
/// outrun the configured schedule the last value keeps applying.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: &[u64]) -> Self {
        Self {
            max_attempts,
            backoff: backoff_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}

#[derive(Debug)]
pub enum RetryOutcome {
    Success,
    /// The retry budget is spent. `attempts` is the budget consumed; the
    /// operation was invoked `attempts + 1` times in total.
    Exhausted {
        last_error: RelayError,
        attempts: u32,
    },
    /// Shutdown fired during the operation or a backoff sleep. Distinct
    /// from exhaustion: the caller must not commit or dead-letter.
    Cancelled,
}

/// Runs `operation` until it succeeds, the attempt budget is spent, or the
/// cancellation token fires. The engine does not inspect error content; any
/// error it sees is treated as retryable, because permanent classification
/// happens upstream before the engine is invoked.
pub async fn invoke<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RelayError>>,
{
    if cancel.is_cancelled() {
        return RetryOutcome::Cancelled;
    }

    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            result = operation() => result,
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
        };

        match result {
            Ok(()) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "operation succeeded after retry");
                }
                return RetryOutcome::Success;
            }
            Err(RelayError::Cancelled) => return RetryOutcome::Cancelled,
            Err(err) => {
                attempt += 1;
                if attempt > policy.max_attempts {
                    return RetryOutcome::Exhausted {
                        last_error: err,
                        attempts: policy.max_attempts,
                    };
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off before retry"
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                }
            }
        }
    }
}
