//! Error classification, per-stage retry policy, correlation IDs, and the
//! advisory-lock / background-retry seams the hybrid policy is built on.

mod lock;
mod queue;

pub use lock::{AdvisoryLock, LockGuard};
pub use queue::{BackgroundRetryQueue, ScheduledRetry};

use crate::types::Stage;
use rand::Rng;
use std::time::Duration;

/// Generate a fresh 8-hex-character `request_id`, one per document run.
#[must_use]
pub fn new_request_id() -> String {
    let n: u32 = rand::rng().random();
    format!("{n:08x}")
}

/// `{request_id}.stage_{stage}.retry_{attempt}` — threads through logs,
/// metrics, and `error_log` rows for a single stage attempt.
#[must_use]
pub fn correlation_id(request_id: &str, stage: Stage, attempt: u32) -> String {
    format!("{request_id}.stage_{}.retry_{attempt}", stage.name())
}

/// The key the advisory lock and background-retry queue index by.
#[must_use]
pub fn lock_key(document_id: uuid::Uuid, stage: Stage) -> String {
    format!("{document_id}:{}", stage.name())
}

/// Hybrid retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Exponential backoff from `base_delay`, capped at `max_delay`, with
    /// `±jitter_factor` applied. `attempt` is 1-based (the delay before the
    /// *next* attempt).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = std::cmp::min(exp, self.max_delay);
        if self.jitter_factor <= 0.0 {
            return capped;
        }
        let range_ms = capped.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::rng().random_range(-range_ms..=range_ms);
        let adjusted = (capped.as_millis() as f64 + jitter).max(0.0);
        Duration::from_millis(adjusted as u64)
    }

    /// What the engine does with a transient failure at this attempt, per
    /// the hybrid retry policy: the first retry runs synchronously, later
    /// ones move to the background queue.
    #[must_use]
    pub fn decision(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        if attempt == 0 {
            RetryDecision::SyncRetry {
                delay: self.delay_for_attempt(attempt + 1),
            }
        } else {
            RetryDecision::BackgroundRetry {
                delay: self.delay_for_attempt(attempt + 1),
            }
        }
    }
}

/// What [`RetryConfig::decision`] says to do about a transient failure.
#[derive(Debug, Clone, Copy)]
pub enum RetryDecision {
    /// Sleep `delay`, then retry synchronously in the same invocation.
    SyncRetry { delay: Duration },
    /// Enqueue a background retry and return `in_progress` to the caller.
    BackgroundRetry { delay: Duration },
    /// `attempt == max_retries`: record a failure, do not retry.
    GiveUp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_has_expected_shape() {
        let id = correlation_id("deadbeef", Stage::Embedding, 2);
        assert_eq!(id, "deadbeef.stage_embedding.retry_2");
    }

    #[test]
    fn first_failure_is_sync_subsequent_are_background() {
        let cfg = RetryConfig::default();
        assert!(matches!(cfg.decision(0), RetryDecision::SyncRetry { .. }));
        assert!(matches!(cfg.decision(1), RetryDecision::BackgroundRetry { .. }));
        assert!(matches!(cfg.decision(3), RetryDecision::GiveUp));
    }

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let cfg = RetryConfig::default().with_base_delay(Duration::from_secs(1));
        let cfg = RetryConfig { jitter_factor: 0.0, ..cfg };
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_secs(4));
    }
}
