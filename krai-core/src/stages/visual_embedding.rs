//! Visual Embedding (stage 5, spec numbering aside): embeds queued
//! image/SVG artifacts' pixels directly. `VisualEmbedding` only depends on
//! `svg_processing`/`image_processing` in the stage graph (it runs well
//! before `storage`/`embedding`), so it reads inline bytes straight off the
//! processing queue rather than a materialized `images` row or object-store
//! upload.
//!
//! Embeddings here are keyed by the queue item's own id as `source_id`
//! under `source_type = image`. That id is never the row id Storage later
//! assigns when it materializes the `images` table (`upsert_image` always
//! mints a fresh one), so `DocumentInfoLookup::lookup_by_source` can't join
//! a visual embedding back to its image row today. Closing that gap means
//! threading the queue item's id through Storage's upsert as the row id —
//! out of scope here; recorded as an open design question.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;

use crate::embedding::EmbeddingSink;
use crate::error::Result;
use crate::processor::Processor;
use crate::storage::ProcessingQueueStore;
use crate::types::{ProcessingContext, ProcessingResult, QueuePayload, SourceType, Stage, UnifiedEmbedding};

/// The vision model server's embedding RPC for raw image bytes.
#[async_trait]
pub trait VisionModelClient: Send + Sync {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>>;
}

/// Used when no vision model server is configured (`DISABLE_VISION_PROCESSING`):
/// every artifact embeds to a zero vector rather than failing the stage.
pub struct NoopVisionModelClient;

#[async_trait]
impl VisionModelClient for NoopVisionModelClient {
    async fn embed_image(&self, _bytes: &[u8]) -> Result<Vec<f32>> {
        Ok(vec![0.0; crate::types::EMBEDDING_DIM])
    }
}

pub struct VisualEmbeddingProcessor {
    queue: Arc<dyn ProcessingQueueStore>,
    model: Arc<dyn VisionModelClient>,
    sink: Arc<dyn EmbeddingSink>,
}

impl VisualEmbeddingProcessor {
    #[must_use]
    pub fn new(queue: Arc<dyn ProcessingQueueStore>, model: Arc<dyn VisionModelClient>, sink: Arc<dyn EmbeddingSink>) -> Self {
        Self { queue, model, sink }
    }

    fn artifact_bytes(payload: &QueuePayload) -> Option<Vec<u8>> {
        match payload {
            QueuePayload::Image { content_base64: Some(b), .. } => BASE64_STANDARD.decode(b).ok(),
            QueuePayload::Svg { png_bytes_base64: Some(b), .. } => BASE64_STANDARD.decode(b).ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl Processor for VisualEmbeddingProcessor {
    fn name(&self) -> &'static str {
        "visual_embedding"
    }

    fn stage(&self) -> Stage {
        Stage::VisualEmbedding
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["unified_embeddings"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let items = self.queue.pending_for_document(context.document_id).await?;

        let mut embedded = 0u64;
        let mut skipped_no_bytes = 0u64;

        for item in &items {
            let Some(bytes) = Self::artifact_bytes(&item.payload) else {
                skipped_no_bytes += 1;
                continue;
            };
            if self.sink.exists(item.id, SourceType::Image).await? {
                continue;
            }
            let vector = self.model.embed_image(&bytes).await?;
            self.sink
                .insert(UnifiedEmbedding::new(context.document_id, item.id, SourceType::Image, vector))
                .await?;
            embedded += 1;
        }

        let mut data = HashMap::new();
        data.insert("embedded".to_string(), serde_json::json!(embedded));
        data.insert("skipped_no_bytes".to_string(), serde_json::json!(skipped_no_bytes));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProcessingQueueItem, QueueItemStatus};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FixedQueue(Vec<ProcessingQueueItem>);
    #[async_trait::async_trait]
    impl ProcessingQueueStore for FixedQueue {
        async fn enqueue(&self, _item: ProcessingQueueItem) -> Result<()> {
            Ok(())
        }
        async fn pending_for_document(&self, _document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
            Ok(self.0.clone())
        }
        async fn mark_status(&self, _item_id: Uuid, _status: QueueItemStatus) -> Result<()> {
            Ok(())
        }
    }

    struct InMemorySink {
        seen: Mutex<Vec<(Uuid, SourceType)>>,
    }

    #[async_trait::async_trait]
    impl EmbeddingSink for InMemorySink {
        async fn exists(&self, source_id: Uuid, source_type: SourceType) -> Result<bool> {
            Ok(self.seen.lock().unwrap().contains(&(source_id, source_type)))
        }
        async fn insert(&self, embedding: UnifiedEmbedding) -> Result<()> {
            self.seen.lock().unwrap().push((embedding.source_id, embedding.source_type));
            Ok(())
        }
    }

    fn image_item(document_id: Uuid, bytes_present: bool) -> ProcessingQueueItem {
        ProcessingQueueItem::new(
            document_id,
            QueuePayload::Image {
                filename: "a.png".to_string(),
                page_number: 1,
                bbox: None,
                image_type: crate::types::ImageType::Photo,
                content_base64: bytes_present.then(|| BASE64_STANDARD.encode(b"bytes")),
                temp_path: None,
                svg_storage_url: None,
                context_caption: None,
                related_error_codes: vec![],
                related_products: vec![],
            },
        )
    }

    #[tokio::test]
    async fn embeds_queued_images_with_inline_bytes() {
        let document_id = Uuid::new_v4();
        let queue = Arc::new(FixedQueue(vec![image_item(document_id, true), image_item(document_id, false)]));
        let sink = Arc::new(InMemorySink { seen: Mutex::new(Vec::new()) });
        let processor = VisualEmbeddingProcessor::new(queue, Arc::new(NoopVisionModelClient), sink.clone());

        let mut ctx = ProcessingContext::new(document_id, Stage::VisualEmbedding);
        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["embedded"], serde_json::json!(1));
        assert_eq!(result.data["skipped_no_bytes"], serde_json::json!(1));
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn already_embedded_artifacts_are_skipped() {
        let document_id = Uuid::new_v4();
        let item = image_item(document_id, true);
        let item_id = item.id;
        let queue = Arc::new(FixedQueue(vec![item]));
        let sink = Arc::new(InMemorySink { seen: Mutex::new(vec![(item_id, SourceType::Image)]) });
        let processor = VisualEmbeddingProcessor::new(queue, Arc::new(NoopVisionModelClient), sink.clone());

        let mut ctx = ProcessingContext::new(document_id, Stage::VisualEmbedding);
        let result = processor.process(&mut ctx).await.unwrap();
        assert_eq!(result.data["embedded"], serde_json::json!(0));
    }
}
