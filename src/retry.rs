//! Retry-with-backoff, implemented once and shared by every gateway call
//! site.
//!
//! Only [`RagError::TransientUpstream`] failures are retried; anything else
//! (validation, fatal upstream rejections, dimension mismatches) returns
//! immediately. Backoff doubles per attempt from `base_delay`, capped at
//! `base_delay << 5`.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{RagError, Result};

/// Attempt count and base delay for one family of upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the given attempt (attempt 0 has no delay).
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// policy's attempts. The closure receives the zero-based attempt number.
pub async fn with_backoff<T, F, Fut>(policy: &BackoffPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(call = label, attempt, error = %e, "transient upstream failure");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        RagError::TransientUpstream(format!("{} failed with no attempts made", label))
    }))
}
