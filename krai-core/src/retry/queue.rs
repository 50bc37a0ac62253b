//! Background retry queue seam: at-most-once delivery per `correlation_id`.

use crate::error::Result;
use crate::types::Stage;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// A retry scheduled to run after `delay`, durable so it survives an engine
/// restart: pending background retries live in the stage-status table and
/// resume on the next engine start.
#[derive(Debug, Clone)]
pub struct ScheduledRetry {
    pub document_id: Uuid,
    pub stage: Stage,
    pub attempt: u32,
    pub correlation_id: String,
    pub delay: Duration,
}

/// An internal queue with at-most-once delivery semantics per
/// `correlation_id`: a supervisor task sleeps for the backoff delay and
/// invokes `safe_process` again with the incremented attempt.
#[async_trait]
pub trait BackgroundRetryQueue: Send + Sync {
    /// Schedule `retry` for execution after its delay elapses. Must not
    /// schedule the same `correlation_id` twice.
    async fn enqueue(&self, retry: ScheduledRetry) -> Result<()>;

    /// Drop every retry scheduled for `document_id`, used on cancellation.
    async fn cancel_document(&self, document_id: Uuid) -> Result<()>;
}

/// An in-process queue for single-node deployments and tests: spawns a
/// `tokio::time::sleep` task per retry and invokes `on_fire` when it elapses.
/// Falling back to a synchronous in-process retry when the retry
/// orchestrator is unavailable is the caller's responsibility — this type
/// only models the happy path.
pub struct InProcessRetryQueue<F>
where
    F: Fn(ScheduledRetry) + Send + Sync + 'static,
{
    on_fire: std::sync::Arc<F>,
    cancelled: std::sync::Arc<parking_lot::Mutex<std::collections::HashSet<Uuid>>>,
}

impl<F> InProcessRetryQueue<F>
where
    F: Fn(ScheduledRetry) + Send + Sync + 'static,
{
    pub fn new(on_fire: F) -> Self {
        Self {
            on_fire: std::sync::Arc::new(on_fire),
            cancelled: std::sync::Arc::new(parking_lot::Mutex::new(std::collections::HashSet::new())),
        }
    }
}

#[async_trait]
impl<F> BackgroundRetryQueue for InProcessRetryQueue<F>
where
    F: Fn(ScheduledRetry) + Send + Sync + 'static,
{
    async fn enqueue(&self, retry: ScheduledRetry) -> Result<()> {
        let on_fire = self.on_fire.clone();
        let cancelled = self.cancelled.clone();
        let document_id = retry.document_id;
        let delay = retry.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if cancelled.lock().contains(&document_id) {
                return;
            }
            on_fire(retry);
        });
        Ok(())
    }

    async fn cancel_document(&self, document_id: Uuid) -> Result<()> {
        self.cancelled.lock().insert(document_id);
        Ok(())
    }
}
