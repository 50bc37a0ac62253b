//! Durable producer/consumer queue between the extraction stages
//! (`svg_processing`, `image_processing`, `link_extraction`) and the Storage
//! stage. Items are keyed by their own id, not by `(document_id, stage)`, so
//! concurrent producers never collide.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ProcessingQueueItem, QueueItemStatus};

#[async_trait]
pub trait ProcessingQueueStore: Send + Sync {
    async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()>;

    /// Every `pending` item queued for `document_id`, in insertion order.
    async fn pending_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingQueueItem>>;

    async fn mark_status(&self, item_id: Uuid, status: QueueItemStatus) -> Result<()>;
}
