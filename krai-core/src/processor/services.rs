//! The storage/lock/queue seams `safe_process` is built against, and the
//! `error_log` table it writes to.

use crate::error::{Classification, Result};
use crate::idempotency::CompletionMarkerStore;
use crate::retry::{AdvisoryLock, BackgroundRetryQueue, RetryConfig};
use crate::types::Stage;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// One row in `error_log`: every failure, transient or not, is recorded here
/// with enough context to reconstruct what happened.
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub error_id: Uuid,
    pub correlation_id: String,
    pub stage: Stage,
    pub document_id: Uuid,
    pub classification: Classification,
    pub retry_attempt: u32,
    pub message: String,
}

#[async_trait]
pub trait ErrorLogStore: Send + Sync {
    async fn record(&self, entry: ErrorLogEntry) -> Result<()>;
}

/// The bundle of collaborators `safe_process` needs. Built once per engine
/// instance and shared across every stage invocation.
#[derive(Clone)]
pub struct ProcessingServices {
    pub completion_markers: Arc<dyn CompletionMarkerStore>,
    pub advisory_lock: Arc<dyn AdvisoryLock>,
    pub background_retries: Arc<dyn BackgroundRetryQueue>,
    pub error_log: Arc<dyn ErrorLogStore>,
    pub retry_config: RetryConfig,
}

impl ProcessingServices {
    #[must_use]
    pub fn new(
        completion_markers: Arc<dyn CompletionMarkerStore>,
        advisory_lock: Arc<dyn AdvisoryLock>,
        background_retries: Arc<dyn BackgroundRetryQueue>,
        error_log: Arc<dyn ErrorLogStore>,
    ) -> Self {
        Self {
            completion_markers,
            advisory_lock,
            background_retries,
            error_log,
            retry_config: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }
}
