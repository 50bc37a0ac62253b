//! Storage (stage 13, spec numbering aside): drains the processing queue
//! built up by `svg_processing`/`image_processing`/`link_extraction`,
//! materializing each artifact into the object store and a relational row
//! via [`StorageStage`], then marks the queue item completed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::processor::Processor;
use crate::storage::{ProcessingQueueStore, StorageStage};
use crate::types::{ProcessingContext, ProcessingResult, QueueItemStatus, Stage};

pub struct StorageProcessor {
    stage: StorageStage,
    queue: Arc<dyn ProcessingQueueStore>,
}

impl StorageProcessor {
    #[must_use]
    pub fn new(stage: StorageStage, queue: Arc<dyn ProcessingQueueStore>) -> Self {
        Self { stage, queue }
    }
}

#[async_trait]
impl Processor for StorageProcessor {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn stage(&self) -> Stage {
        Stage::Storage
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["images", "links", "videos"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let items = self.queue.pending_for_document(context.document_id).await?;

        let mut stored = 0u64;
        let mut already_existed = 0u64;

        for item in &items {
            let (_id, outcome) = self.stage.process_item(item).await?;
            self.queue.mark_status(item.id, QueueItemStatus::Completed).await?;
            match outcome {
                crate::storage::StorageOutcome::Inserted => stored += 1,
                crate::storage::StorageOutcome::AlreadyExists => already_existed += 1,
            }
        }

        let mut data = HashMap::new();
        data.insert("stored".to_string(), serde_json::json!(stored));
        data.insert("already_existed".to_string(), serde_json::json!(already_existed));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ImageRow, LinkRow, PutResult, RelationalStore, UpsertOutcome, VideoRow};
    use crate::types::{ProcessingQueueItem, QueuePayload};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeObjectStore;
    #[async_trait::async_trait]
    impl crate::storage::ObjectStore for FakeObjectStore {
        async fn put(&self, _bucket: &str, _content_type: &str, bytes: &[u8]) -> Result<PutResult> {
            Ok(PutResult {
                storage_path: "document_images/x".to_string(),
                public_url: Some("https://store.example/x".to_string()),
                content_hash: crate::idempotency::sha256_hex(bytes),
            })
        }
        async fn exists(&self, _bucket: &str, _content_hash: &str) -> Result<bool> {
            Ok(false)
        }
        async fn public_url(&self, _bucket: &str, _content_hash: &str) -> Option<String> {
            None
        }
    }

    struct FakeRelational(Mutex<u32>);
    #[async_trait::async_trait]
    impl RelationalStore for FakeRelational {
        async fn upsert_image(&self, _row: ImageRow) -> Result<(Uuid, UpsertOutcome)> {
            *self.0.lock().unwrap() += 1;
            Ok((Uuid::new_v4(), UpsertOutcome::Inserted))
        }
        async fn upsert_link(&self, _row: LinkRow) -> Result<(Uuid, UpsertOutcome)> {
            *self.0.lock().unwrap() += 1;
            Ok((Uuid::new_v4(), UpsertOutcome::Inserted))
        }
        async fn upsert_video(&self, _row: VideoRow) -> Result<(Uuid, UpsertOutcome)> {
            *self.0.lock().unwrap() += 1;
            Ok((Uuid::new_v4(), UpsertOutcome::Inserted))
        }
    }

    struct RecordingQueue {
        items: Mutex<Vec<ProcessingQueueItem>>,
        completed: Mutex<Vec<Uuid>>,
    }
    #[async_trait::async_trait]
    impl ProcessingQueueStore for RecordingQueue {
        async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()> {
            self.items.lock().unwrap().push(item);
            Ok(())
        }
        async fn pending_for_document(&self, _document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
            Ok(self.items.lock().unwrap().clone())
        }
        async fn mark_status(&self, item_id: Uuid, _status: QueueItemStatus) -> Result<()> {
            self.completed.lock().unwrap().push(item_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn drains_the_queue_and_marks_items_completed() {
        let document_id = Uuid::new_v4();
        let link_item = ProcessingQueueItem::new(
            document_id,
            QueuePayload::Link {
                url: "https://example.com".to_string(),
                page_number: 1,
                context_description: None,
                related_error_codes: vec![],
                related_products: vec![],
            },
        );
        let item_id = link_item.id;
        let queue = Arc::new(RecordingQueue { items: Mutex::new(vec![link_item]), completed: Mutex::new(Vec::new()) });
        let relational = Arc::new(FakeRelational(Mutex::new(0)));
        let processor = StorageProcessor::new(StorageStage::new(Arc::new(FakeObjectStore), relational.clone()), queue.clone());

        let mut ctx = ProcessingContext::new(document_id, Stage::Storage);
        let result = processor.process(&mut ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data["stored"], serde_json::json!(1));
        assert_eq!(*relational.0.lock().unwrap(), 1);
        assert_eq!(queue.completed.lock().unwrap().as_slice(), &[item_id]);
    }

    #[tokio::test]
    async fn an_empty_queue_stores_nothing() {
        let document_id = Uuid::new_v4();
        let queue = Arc::new(RecordingQueue { items: Mutex::new(Vec::new()), completed: Mutex::new(Vec::new()) });
        let processor =
            StorageProcessor::new(StorageStage::new(Arc::new(FakeObjectStore), Arc::new(FakeRelational(Mutex::new(0)))), queue);

        let mut ctx = ProcessingContext::new(document_id, Stage::Storage);
        let result = processor.process(&mut ctx).await.unwrap();
        assert_eq!(result.data["stored"], serde_json::json!(0));
    }
}
