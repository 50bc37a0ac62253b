//! OCR fallback seam, applied per-page only when a page yields empty text.

use crate::error::Result;
use std::path::Path;

pub trait OcrEngine: Send + Sync {
    /// Run OCR on `page_number` (0-based) of the PDF at `path`.
    fn ocr_page(&self, path: &Path, page_number: u32) -> Result<String>;
}

/// Used when `ENABLE_OCR_FALLBACK=0`: never invoked because
/// [`DefaultPdfExtractor`](super::DefaultPdfExtractor) only calls the OCR
/// engine when the fallback is enabled, but kept as a safe default so an
/// engine can be constructed without wiring a real OCR backend.
pub struct NoopOcr;

impl OcrEngine for NoopOcr {
    fn ocr_page(&self, _path: &Path, _page_number: u32) -> Result<String> {
        Ok(String::new())
    }
}
