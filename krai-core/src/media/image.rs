//! Image stage: raster image extraction, per-page dedup, and queueing for
//! the Storage stage.

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::idempotency::sha256_hex;
use crate::media::context::ContextExtractor;
use crate::types::{BoundingBox, ImageType, ProcessingQueueItem, QueuePayload};

/// One raster image pulled off a page, prior to type inference and queueing.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub page_number: u32,
    pub bytes: Vec<u8>,
    pub bbox: Option<BoundingBox>,
    pub filename: String,
}

/// Backend capable of pulling embedded raster images off a PDF page.
pub trait RasterImageExtractor: Send + Sync {
    fn extract_page(&self, path: &Path, page_number: u32) -> Result<Vec<RasterImage>>;
}

/// Used when no raster-image-capable backend is wired: every page yields
/// zero images.
pub struct NoopRasterImageExtractor;

impl RasterImageExtractor for NoopRasterImageExtractor {
    fn extract_page(&self, _path: &Path, _page_number: u32) -> Result<Vec<RasterImage>> {
        Ok(Vec::new())
    }
}

/// Heuristically infers an [`ImageType`] from the image's place in the
/// document: screenshots tend to be wide full-page captures, diagrams tend
/// to be smaller inline figures, everything else defaults to a photo.
#[must_use]
pub fn infer_image_type(bbox: Option<BoundingBox>, page_width: f64, page_height: f64) -> ImageType {
    let Some(bbox) = bbox else {
        return ImageType::Photo;
    };
    let width = bbox.x1 - bbox.x0;
    let height = bbox.y1 - bbox.y0;
    if page_width > 0.0 && page_height > 0.0 && width >= page_width * 0.9 && height >= page_height * 0.9 {
        ImageType::Screenshot
    } else if width > 0.0 && height > 0.0 && (width / height - 1.0).abs() < 0.15 {
        ImageType::Diagram
    } else {
        ImageType::Photo
    }
}

pub struct ImageStage {
    extractor: Arc<dyn RasterImageExtractor>,
    context: ContextExtractor,
}

impl ImageStage {
    #[must_use]
    pub fn new(extractor: Arc<dyn RasterImageExtractor>, context: ContextExtractor) -> Self {
        Self { extractor, context }
    }

    /// Extract and queue every raster image on `page_number`, deduplicating
    /// repeated bytes within the page (a logo stamped on every figure, say).
    pub fn process_page(
        &self,
        document_id: Uuid,
        pdf_path: &Path,
        page_number: u32,
        page_text: &str,
        page_width: f64,
        page_height: f64,
    ) -> Result<Vec<ProcessingQueueItem>> {
        let images = self.extractor.extract_page(pdf_path, page_number)?;

        let mut seen_hashes = HashSet::new();
        let mut items = Vec::with_capacity(images.len());

        for image in images {
            let hash = sha256_hex(&image.bytes);
            if !seen_hashes.insert(hash) {
                continue;
            }

            let ctx = self.context.extract_image_context(page_text, image.bbox, page_height);
            let image_type = infer_image_type(image.bbox, page_width, page_height);
            let payload = QueuePayload::Image {
                filename: image.filename,
                page_number: image.page_number,
                bbox: image.bbox,
                image_type,
                content_base64: Some(BASE64_STANDARD.encode(&image.bytes)),
                temp_path: None,
                svg_storage_url: None,
                context_caption: ctx.context_caption.clone(),
                related_error_codes: ctx.related_error_codes.clone(),
                related_products: ctx.related_products.clone(),
            };
            items.push(ProcessingQueueItem::new(document_id, payload));
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_bytes_within_a_page_are_deduped() {
        struct TwoCopies;
        impl RasterImageExtractor for TwoCopies {
            fn extract_page(&self, _path: &Path, page_number: u32) -> Result<Vec<RasterImage>> {
                Ok(vec![
                    RasterImage {
                        page_number,
                        bytes: vec![1, 2, 3],
                        bbox: None,
                        filename: "a.png".to_string(),
                    },
                    RasterImage {
                        page_number,
                        bytes: vec![1, 2, 3],
                        bbox: None,
                        filename: "b.png".to_string(),
                    },
                ])
            }
        }

        let stage = ImageStage::new(Arc::new(TwoCopies), ContextExtractor::default());
        let items = stage
            .process_page(Uuid::new_v4(), Path::new("/tmp/doc.pdf"), 1, "some page text", 612.0, 792.0)
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn square_bbox_is_classified_as_diagram() {
        let bbox = BoundingBox { x0: 0.0, y0: 0.0, x1: 100.0, y1: 100.0 };
        assert_eq!(infer_image_type(Some(bbox), 612.0, 792.0), ImageType::Diagram);
    }

    #[test]
    fn full_page_bbox_is_classified_as_screenshot() {
        let bbox = BoundingBox { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 };
        assert_eq!(infer_image_type(Some(bbox), 612.0, 792.0), ImageType::Screenshot);
    }
}
