//! SVG stage: vector graphic extraction, direct-to-store upload of the
//! original, PNG rasterization for Vision analysis, and queueing for the
//! Storage stage.

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::media::context::ContextExtractor;
use crate::storage::ObjectStore;
use crate::types::{BoundingBox, ImageType, ProcessingQueueItem, QueuePayload};

/// How a vector drawing was isolated on its page, in decreasing specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvgExtractionMethod {
    DisplayList,
    XObject,
    PageLevel,
}

impl SvgExtractionMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SvgExtractionMethod::DisplayList => "display_list",
            SvgExtractionMethod::XObject => "xobject",
            SvgExtractionMethod::PageLevel => "page_level",
        }
    }
}

/// One vector graphic pulled off a page, prior to upload/conversion.
#[derive(Debug, Clone)]
pub struct VectorDrawing {
    pub page_number: u32,
    pub graphic_index: u32,
    pub svg_bytes: Vec<u8>,
    pub bbox: BoundingBox,
    pub extraction_method: SvgExtractionMethod,
}

/// Backend capable of pulling vector graphics off a PDF page. Implementations
/// are expected to try per-drawing bounding boxes first, then embedded
/// xobjects, then fall back to a single page-level graphic.
pub trait VectorGraphicsExtractor: Send + Sync {
    fn extract_page(&self, path: &Path, page_number: u32) -> Result<Vec<VectorDrawing>>;
}

/// Used when no vector-graphics-capable backend is wired: every page yields
/// zero drawings, which is a legitimate (if conservative) outcome rather than
/// a stage failure.
pub struct NoopVectorGraphicsExtractor;

impl VectorGraphicsExtractor for NoopVectorGraphicsExtractor {
    fn extract_page(&self, _path: &Path, _page_number: u32) -> Result<Vec<VectorDrawing>> {
        Ok(Vec::new())
    }
}

/// Rasterizes SVG bytes to PNG at a given DPI — the preferred path of the
/// two-step conversion fallback chain.
pub trait SvgRasterizer: Send + Sync {
    fn rasterize(&self, svg_bytes: &[u8], dpi: u32) -> Result<Vec<u8>>;
}

/// The default rasterizer, backed by usvg/resvg/tiny-skia.
pub struct UsvgRasterizer;

impl SvgRasterizer for UsvgRasterizer {
    fn rasterize(&self, svg_bytes: &[u8], dpi: u32) -> Result<Vec<u8>> {
        let opts = usvg::Options::default();
        let tree = usvg::Tree::from_data(svg_bytes, &opts).map_err(|e| Error::Svg(e.to_string()))?;

        let scale = dpi as f32 / 96.0;
        let size = tree.size();
        let width = ((size.width() * scale).round() as u32).max(1);
        let height = ((size.height() * scale).round() as u32).max(1);

        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| Error::Svg("SVG has zero width or height".to_string()))?;
        resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        pixmap.encode_png().map_err(|e| Error::Svg(e.to_string()))
    }
}

/// Fallback when SVG rasterization fails: render the bbox region straight
/// from the PDF page.
pub trait PdfRegionRenderer: Send + Sync {
    fn render_region(&self, path: &Path, page_number: u32, bbox: BoundingBox, dpi: u32) -> Result<Vec<u8>>;
}

/// Used when no PDF-region renderer is wired: the fallback simply isn't
/// available, so the SVG is kept without a PNG derivative.
pub struct NoopPdfRegionRenderer;

impl PdfRegionRenderer for NoopPdfRegionRenderer {
    fn render_region(&self, _path: &Path, _page_number: u32, _bbox: BoundingBox, _dpi: u32) -> Result<Vec<u8>> {
        Err(Error::Svg("no PDF-region renderer is configured".to_string()))
    }
}

/// Outcome of processing one [`VectorDrawing`]: what was uploaded/converted,
/// and the queue item ready for the Storage stage.
pub struct SvgResult {
    pub queue_item: ProcessingQueueItem,
    pub svg_storage_url: Option<String>,
    pub has_png_derivative: bool,
}

pub struct SvgStageConfig {
    pub dpi: u32,
    pub inline_storage_threshold_bytes: u64,
    pub disable_vision_processing: bool,
}

/// Orchestrates per-page vector-graphic extraction into queued storage
/// payloads. Re-running on the same document is a no-op downstream because
/// the Storage stage dedups images by `(document_id, file_hash)`.
pub struct SvgStage {
    extractor: Arc<dyn VectorGraphicsExtractor>,
    rasterizer: Arc<dyn SvgRasterizer>,
    region_renderer: Arc<dyn PdfRegionRenderer>,
    context: ContextExtractor,
    config: SvgStageConfig,
}

impl SvgStage {
    #[must_use]
    pub fn new(
        extractor: Arc<dyn VectorGraphicsExtractor>,
        rasterizer: Arc<dyn SvgRasterizer>,
        region_renderer: Arc<dyn PdfRegionRenderer>,
        context: ContextExtractor,
        config: SvgStageConfig,
    ) -> Self {
        Self {
            extractor,
            rasterizer,
            region_renderer,
            context,
            config,
        }
    }

    /// Extract and process every vector drawing on `page_number`.
    pub async fn process_page(
        &self,
        document_id: Uuid,
        pdf_path: &Path,
        page_number: u32,
        page_text: &str,
        page_height: f64,
        object_store: &dyn ObjectStore,
    ) -> Result<Vec<SvgResult>> {
        let drawings = self.extractor.extract_page(pdf_path, page_number)?;
        let mut results = Vec::with_capacity(drawings.len());
        for drawing in drawings {
            results.push(
                self.process_drawing(document_id, pdf_path, drawing, page_text, page_height, object_store)
                    .await?,
            );
        }
        Ok(results)
    }

    /// Upload the original SVG directly to the object store and, once
    /// converted, queue an image payload for the Storage stage to persist.
    /// Conversion failure never fails the stage: the SVG is still uploaded
    /// and queued, just without a PNG derivative and without vision analysis.
    pub async fn process_drawing(
        &self,
        document_id: Uuid,
        pdf_path: &Path,
        drawing: VectorDrawing,
        page_text: &str,
        page_height: f64,
        object_store: &dyn ObjectStore,
    ) -> Result<SvgResult> {
        let svg_size = drawing.svg_bytes.len() as u64;

        let put = object_store.put("document_images", "image/svg+xml", &drawing.svg_bytes).await;
        let svg_storage_url = match put {
            Ok(result) => result.public_url.or(Some(result.storage_path)),
            Err(e) => {
                tracing::warn!(error = %e, page = drawing.page_number, "failed to upload SVG to object store");
                None
            }
        };

        let inline_svg = if svg_size <= self.config.inline_storage_threshold_bytes {
            Some(BASE64_STANDARD.encode(&drawing.svg_bytes))
        } else {
            None
        };

        let png_bytes = if self.config.disable_vision_processing {
            None
        } else {
            self.convert_to_png(pdf_path, &drawing)
        };
        let has_png_derivative = png_bytes.is_some();

        let ctx = self.context.extract_image_context(page_text, Some(drawing.bbox), page_height);
        let filename = format!(
            "page_{}_graphic_{:02}.{}",
            drawing.page_number,
            drawing.graphic_index,
            if has_png_derivative { "png" } else { "svg" }
        );

        let payload = QueuePayload::Svg {
            filename,
            page_number: drawing.page_number,
            bbox: Some(drawing.bbox),
            extraction_method: drawing.extraction_method.as_str(),
            svg_bytes_base64: inline_svg.unwrap_or_default(),
            png_bytes_base64: png_bytes.map(|b| BASE64_STANDARD.encode(b)),
            context_caption: ctx.context_caption,
            related_error_codes: ctx.related_error_codes,
            related_products: ctx.related_products,
        };

        Ok(SvgResult {
            queue_item: ProcessingQueueItem::new(document_id, payload),
            svg_storage_url,
            has_png_derivative,
        })
    }

    fn convert_to_png(&self, pdf_path: &Path, drawing: &VectorDrawing) -> Option<Vec<u8>> {
        match self.rasterizer.rasterize(&drawing.svg_bytes, self.config.dpi) {
            Ok(png) => return Some(png),
            Err(e) => tracing::debug!(error = %e, "SVG rasterization failed, trying PDF-region fallback"),
        }

        match self
            .region_renderer
            .render_region(pdf_path, drawing.page_number, drawing.bbox, self.config.dpi)
        {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::info!(error = %e, page = drawing.page_number, "no PNG derivative available, skipping vision analysis for this artifact");
                None
            }
        }
    }
}

/// Infer an [`ImageType`] for a converted SVG: always `vector_graphic`.
#[must_use]
pub fn svg_image_type() -> ImageType {
    ImageType::VectorGraphic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::sha256_hex;
    use crate::storage::PutResult;
    use async_trait::async_trait;

    struct FakeStore;

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put(&self, _bucket: &str, _content_type: &str, bytes: &[u8]) -> Result<PutResult> {
            let hash = sha256_hex(bytes);
            Ok(PutResult {
                storage_path: format!("document_images/{hash}"),
                public_url: Some(format!("https://store.example/document_images/{hash}")),
                content_hash: hash,
            })
        }
        async fn exists(&self, _bucket: &str, _content_hash: &str) -> Result<bool> {
            Ok(false)
        }
        async fn public_url(&self, _bucket: &str, content_hash: &str) -> Option<String> {
            Some(format!("https://store.example/document_images/{content_hash}"))
        }
    }

    struct FailingRasterizer;
    impl SvgRasterizer for FailingRasterizer {
        fn rasterize(&self, _svg_bytes: &[u8], _dpi: u32) -> Result<Vec<u8>> {
            Err(Error::Svg("unsupported shape".to_string()))
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox { x0: 0.0, y0: 0.0, x1: 100.0, y1: 100.0 }
    }

    #[tokio::test]
    async fn conversion_failure_still_uploads_and_queues_without_png() {
        let stage = SvgStage::new(
            Arc::new(NoopVectorGraphicsExtractor),
            Arc::new(FailingRasterizer),
            Arc::new(NoopPdfRegionRenderer),
            ContextExtractor::default(),
            SvgStageConfig {
                dpi: 300,
                inline_storage_threshold_bytes: 1024 * 100,
                disable_vision_processing: false,
            },
        );
        let drawing = VectorDrawing {
            page_number: 1,
            graphic_index: 0,
            svg_bytes: b"<svg xmlns='http://www.w3.org/2000/svg'></svg>".to_vec(),
            bbox: bbox(),
            extraction_method: SvgExtractionMethod::PageLevel,
        };
        let result = stage
            .process_drawing(Uuid::new_v4(), Path::new("/tmp/doc.pdf"), drawing, "page text", 792.0, &FakeStore)
            .await
            .expect("processing should succeed even without a PNG derivative");

        assert!(!result.has_png_derivative);
        assert!(result.svg_storage_url.is_some());
        assert_eq!(result.queue_item.payload.artifact_type(), "svg");
    }

    #[tokio::test]
    async fn small_svg_is_kept_inline() {
        let stage = SvgStage::new(
            Arc::new(NoopVectorGraphicsExtractor),
            Arc::new(FailingRasterizer),
            Arc::new(NoopPdfRegionRenderer),
            ContextExtractor::default(),
            SvgStageConfig {
                dpi: 300,
                inline_storage_threshold_bytes: 1024 * 100,
                disable_vision_processing: true,
            },
        );
        let svg_bytes = b"<svg xmlns='http://www.w3.org/2000/svg'></svg>".to_vec();
        let drawing = VectorDrawing {
            page_number: 2,
            graphic_index: 0,
            svg_bytes: svg_bytes.clone(),
            bbox: bbox(),
            extraction_method: SvgExtractionMethod::DisplayList,
        };
        let result = stage
            .process_drawing(Uuid::new_v4(), Path::new("/tmp/doc.pdf"), drawing, "", 792.0, &FakeStore)
            .await
            .unwrap();

        match result.queue_item.payload {
            QueuePayload::Svg { svg_bytes_base64, .. } => {
                assert_eq!(BASE64_STANDARD.decode(svg_bytes_base64).unwrap(), svg_bytes);
            }
            _ => panic!("expected an Svg payload"),
        }
    }
}
