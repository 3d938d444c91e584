use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::{GleanerError, Result};

/// Bounded retry with a fixed pause between attempts.
///
/// Wraps browser interactions that fail transiently: elements not yet
/// rendered, navigations that time out, controls covered by overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 3)
    pub max_attempts: u32,

    /// Pause after each failed attempt in milliseconds (default: 1000)
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `action` until it succeeds or the attempts are exhausted.
    ///
    /// Session-fatal errors are returned immediately. Exhaustion yields
    /// `InteractionFailed` carrying the last cause.
    pub async fn run<T, F, Fut>(&self, label: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match action().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", label, attempt, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_session_fatal() => {
                    warn!("{} hit a session failure, not retrying: {}", label, e);
                    return Err(e);
                }
                Err(e) if attempt >= attempts => {
                    warn!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(GleanerError::InteractionFailed {
                        cause: e.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    debug!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        label,
                        attempt,
                        attempts,
                        self.backoff(),
                        e
                    );
                    tokio::time::sleep(self.backoff()).await;
                }
            }
        }
    }
}
