//! SVG Processing (stage 3): extracts vector drawings per page, uploads
//! originals directly to the object store, and queues each for the Storage
//! stage — mirroring [`crate::stages::ImageProcessingProcessor`]'s placeholder
//! population of `context.images` for the embedding stage's context path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::media::svg::svg_image_type;
use crate::media::SvgStage;
use crate::processor::Processor;
use crate::storage::{ObjectStore, ProcessingQueueStore};
use crate::types::{Image, ProcessingContext, ProcessingResult, QueuePayload, Stage};

const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

pub struct SvgProcessingProcessor {
    stage: SvgStage,
    queue: Arc<dyn ProcessingQueueStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl SvgProcessingProcessor {
    #[must_use]
    pub fn new(stage: SvgStage, queue: Arc<dyn ProcessingQueueStore>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self { stage, queue, object_store }
    }
}

#[async_trait]
impl Processor for SvgProcessingProcessor {
    fn name(&self) -> &'static str {
        "svg_processing"
    }

    fn stage(&self) -> Stage {
        Stage::SvgProcessing
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
            let results = self
                .stage
                .process_page(context.document_id, pdf_path, page_number, page_text, DEFAULT_PAGE_HEIGHT, self.object_store.as_ref())
                .await?;
            for result in results {
                images.push(placeholder_image(
                    &result.queue_item.payload,
                    result.queue_item.id,
                    result.queue_item.document_id,
                    result.svg_storage_url.clone(),
                    result.has_png_derivative,
                ));
                self.queue.enqueue(result.queue_item).await?;
                queued += 1;
            }
        }

        context.images = Some(images);

        let mut data = HashMap::new();
        data.insert("svgs_queued".to_string(), serde_json::json!(queued));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

fn placeholder_image(
    payload: &QueuePayload,
    id: uuid::Uuid,
    document_id: uuid::Uuid,
    svg_storage_url: Option<String>,
    has_png_derivative: bool,
) -> Image {
    let QueuePayload::Svg { filename, page_number, bbox, context_caption, related_error_codes, related_products, .. } = payload
    else {
        unreachable!("SvgStage::process_page only ever produces Svg payloads")
    };

    Image {
        id,
        document_id,
        storage_url: String::new(),
        filename: filename.clone(),
        page_number: *page_number,
        bbox: *bbox,
        image_type: svg_image_type(),
        file_hash: String::new(),
        context_caption: context_caption.clone(),
        related_error_codes: related_error_codes.clone(),
        related_products: related_products.clone(),
        svg_storage_url,
        has_png_derivative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::context::ContextExtractor;
    use crate::media::svg::{
        NoopPdfRegionRenderer, NoopVectorGraphicsExtractor, SvgExtractionMethod, SvgRasterizer, SvgStageConfig,
        VectorDrawing, VectorGraphicsExtractor,
    };
    use crate::storage::PutResult;
    use crate::types::{BoundingBox, ProcessingQueueItem, QueueItemStatus};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct OneDrawing;
    impl VectorGraphicsExtractor for OneDrawing {
        fn extract_page(&self, _path: &std::path::Path, page_number: u32) -> Result<Vec<VectorDrawing>> {
            Ok(vec![VectorDrawing {
                page_number,
                graphic_index: 0,
                svg_bytes: b"<svg xmlns='http://www.w3.org/2000/svg'></svg>".to_vec(),
                bbox: BoundingBox { x0: 0.0, y0: 0.0, x1: 10.0, y1: 10.0 },
                extraction_method: SvgExtractionMethod::PageLevel,
            }])
        }
    }

    struct FailingRasterizer;
    impl SvgRasterizer for FailingRasterizer {
        fn rasterize(&self, _svg_bytes: &[u8], _dpi: u32) -> Result<Vec<u8>> {
            Err(crate::error::Error::Svg("unsupported".to_string()))
        }
    }

    struct FakeStore;
    #[async_trait::async_trait]
    impl ObjectStore for FakeStore {
        async fn put(&self, _bucket: &str, _content_type: &str, _bytes: &[u8]) -> Result<PutResult> {
            Ok(PutResult {
                storage_path: "document_images/x".to_string(),
                public_url: Some("https://store.example/x".to_string()),
                content_hash: "x".to_string(),
            })
        }
        async fn exists(&self, _bucket: &str, _content_hash: &str) -> Result<bool> {
            Ok(false)
        }
        async fn public_url(&self, _bucket: &str, _content_hash: &str) -> Option<String> {
            None
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
        async fn mark_status(&self, _item_id: Uuid, _status: QueueItemStatus) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn queues_svgs_and_populates_context_placeholders() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = SvgProcessingProcessor::new(
            SvgStage::new(
                Arc::new(OneDrawing),
                Arc::new(FailingRasterizer),
                Arc::new(NoopPdfRegionRenderer),
                ContextExtractor::default(),
                SvgStageConfig { dpi: 300, inline_storage_threshold_bytes: 1024, disable_vision_processing: true },
            ),
            queue.clone(),
            Arc::new(FakeStore),
        );
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::SvgProcessing);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "page text".to_string());
        ctx.page_texts = Some(pages);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(queue.0.lock().unwrap().len(), 1);
        assert_eq!(ctx.images.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_page_with_no_drawings_queues_nothing() {
        let queue = Arc::new(RecordingQueue(Mutex::new(Vec::new())));
        let processor = SvgProcessingProcessor::new(
            SvgStage::new(
                Arc::new(NoopVectorGraphicsExtractor),
                Arc::new(FailingRasterizer),
                Arc::new(NoopPdfRegionRenderer),
                ContextExtractor::default(),
                SvgStageConfig { dpi: 300, inline_storage_threshold_bytes: 1024, disable_vision_processing: true },
            ),
            queue.clone(),
            Arc::new(FakeStore),
        );
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::SvgProcessing);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "text".to_string());
        ctx.page_texts = Some(pages);

        processor.process(&mut ctx).await.unwrap();
        assert!(queue.0.lock().unwrap().is_empty());
    }
}
