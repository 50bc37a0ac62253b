//! Image Processing (stage 4): extracts raster images per page and queues
//! them for the Storage stage, while also populating `context.images` with
//! placeholder rows so `embedding` can pick up each image's context caption
//! under `source_type = context` within the same run.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::idempotency::sha256_hex;
use crate::media::ImageStage;
use crate::processor::Processor;
use crate::storage::ProcessingQueueStore;
use crate::types::{Image, ProcessingContext, ProcessingQueueItem, ProcessingResult, QueuePayload, Stage};

/// US Letter at 72 DPI. No page-dimension capture exists upstream of this
/// stage, so every page is scored against this fixed size; a document with
/// genuinely different page dimensions will see skewed screenshot/diagram
/// classification until a real per-page size is threaded through from text
/// extraction.
const DEFAULT_PAGE_WIDTH: f64 = 612.0;
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

pub struct ImageProcessingProcessor {
    stage: ImageStage,
    queue: std::sync::Arc<dyn ProcessingQueueStore>,
}

impl ImageProcessingProcessor {
    #[must_use]
    pub fn new(stage: ImageStage, queue: std::sync::Arc<dyn ProcessingQueueStore>) -> Self {
        Self { stage, queue }
    }
}

#[async_trait]
impl Processor for ImageProcessingProcessor {
    fn name(&self) -> &'static str {
        "image_processing"
    }

    fn stage(&self) -> Stage {
        Stage::ImageProcessing
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["file_path", "page_texts"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["processing_queue"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let raw_path = context
            .file_path
            .as_deref()
            .ok_or_else(|| Error::MissingInput("file_path".to_string()))?;
        let page_texts = context
            .page_texts
            .as_ref()
            .ok_or_else(|| Error::MissingInput("page_texts".to_string()))?;
        let pdf_path = std::path::Path::new(raw_path);
        let ordered: BTreeMap<u32, &String> = page_texts.iter().map(|(p, t)| (*p, t)).collect();

        let mut queued = 0u64;
        let mut images = context.images.clone().unwrap_or_default();

        for (page_number, page_text) in ordered {
            let items = self
                .stage
                .process_page(context.document_id, pdf_path, page_number, page_text, DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)?;
            for item in items {
                images.push(placeholder_image(&item));
                self.queue.enqueue(item).await?;
                queued += 1;
            }
        }

        context.images = Some(images);

        let mut data = HashMap::new();
        data.insert("images_queued".to_string(), serde_json::json!(queued));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

/// The image row Storage will eventually materialize, stood in for here
/// under the queue item's own id — see [`crate::stages::VisualEmbeddingProcessor`]
/// for why that id never reconciles with the one Storage actually assigns.
fn placeholder_image(item: &ProcessingQueueItem) -> Image {
    let QueuePayload::Image {
        filename,
        page_number,
        bbox,
        image_type,
        content_base64,
        context_caption,
        related_error_codes,
        related_products,
        ..
    } = &item.payload
    else {
        unreachable!("ImageStage::process_page only ever produces Image payloads")
    };

    let file_hash = content_base64
        .as_deref()
        .and_then(|b| BASE64_STANDARD.decode(b).ok())
        .map(|bytes| sha256_hex(&bytes))
        .unwrap_or_default();

    Image {
        id: item.id,
        document_id: item.document_id,
        storage_url: String::new(),
        filename: filename.clone(),
        page_number: *page_number,
        bbox: *bbox,
        image_type: *image_type,
        file_hash,
        context_caption: context_caption.clone(),
        related_error_codes: related_error_codes.clone(),
        related_products: related_products.clone(),
        svg_storage_url: None,
        has_png_derivative: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::context::ContextExtractor;
    use crate::media::image::{NoopRasterImageExtractor, RasterImage, RasterImageExtractor};
    use async_trait::async_trait as _;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct OneImage;
    impl RasterImageExtractor for OneImage {
        fn extract_page(&self, _path: &std::path::Path, page_number: u32) -> Result<Vec<RasterImage>> {
            Ok(vec![RasterImage {
                page_number,
                bytes: vec![9, 9, 9],
                bbox: None,
                filename: "fig.png".to_string(),
            }])
        }
    }

    struct RecordingQueue(Mutex<Vec<ProcessingQueueItem>>);

    #[async_trait::async_trait]
    impl ProcessingQueueStore for RecordingQueue {
        async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()> {
            self.0.lock().unwrap().push(item);
            Ok(())
        }
        async fn pending_for_document(&self, _document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn mark_status(&self, _item_id: Uuid, _status: crate::types::QueueItemStatus) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn queues_images_and_populates_context_placeholders() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = ImageProcessingProcessor::new(
            ImageStage::new(Arc::new(OneImage), ContextExtractor::default()),
            queue.clone(),
        );
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::ImageProcessing);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "some page text".to_string());
        ctx.page_texts = Some(pages);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(queue.0.lock().unwrap().len(), 1);
        assert_eq!(ctx.images.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_page_with_no_images_queues_nothing() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = ImageProcessingProcessor::new(
            ImageStage::new(Arc::new(NoopRasterImageExtractor), ContextExtractor::default()),
            queue.clone(),
        );
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::ImageProcessing);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "text".to_string());
        ctx.page_texts = Some(pages);

        processor.process(&mut ctx).await.unwrap();
        assert!(queue.0.lock().unwrap().is_empty());
    }
}
