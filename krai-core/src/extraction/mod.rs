//! PDF Text Extractor: per-page text, page metadata, optional OCR
//! fallback, all behind a stable output shape regardless of backend.

mod ocr;

pub use ocr::{NoopOcr, OcrEngine};

use crate::config::PdfEngine;
use crate::error::{Error, Result};
use oxidize_pdf::parser::{PdfDocument, PdfReader};
use std::collections::HashMap;
use std::path::Path;

/// Document-level metadata the extractor can recover, independent of which
/// backend produced it.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub page_count: u32,
    pub title: Option<String>,
    pub language: Option<String>,
    pub creator: Option<String>,
}

/// The stable output shape every backend must produce, independent of
/// whichever engine produced it.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub page_texts: HashMap<u32, String>,
    pub metadata: DocumentMetadata,
    /// Per-page structured text runs, when the backend exposes them
    /// (font/position information used by context extraction's bbox path).
    pub structured_texts: Option<HashMap<u32, Vec<TextRun>>>,
}

#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub bbox: Option<crate::types::BoundingBox>,
}

/// Extracts text from a PDF on disk. Both backends behind [`PdfEngine`]
/// produce the same [`ExtractedDocument`] shape.
pub trait PdfTextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}

/// The default, oxidize-pdf-backed extractor. Used for both
/// [`PdfEngine::PymupdfEquiv`] and [`PdfEngine::PdfplumberEquiv`] selections —
/// the engine choice only changes downstream heuristics (e.g. header
/// detection), not the extraction backend itself, since both must yield an
/// identical `page_texts` shape.
pub struct DefaultPdfExtractor {
    pub ocr: Box<dyn OcrEngine>,
    pub enable_ocr_fallback: bool,
    #[allow(dead_code)]
    pub engine: PdfEngine,
}

impl DefaultPdfExtractor {
    #[must_use]
    pub fn new(engine: PdfEngine, enable_ocr_fallback: bool, ocr: Box<dyn OcrEngine>) -> Self {
        Self {
            ocr,
            enable_ocr_fallback,
            engine,
        }
    }
}

impl PdfTextExtractor for DefaultPdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let reader = PdfReader::open(path).map_err(|e| Error::Pdf(e.to_string()))?;
        let document = PdfDocument::new(reader);
        let pages = document.extract_text().map_err(|e| Error::Pdf(e.to_string()))?;

        let mut page_texts = HashMap::with_capacity(pages.len());
        for (idx, page) in pages.iter().enumerate() {
            let mut text = page.text.clone();
            if text.trim().is_empty() && self.enable_ocr_fallback {
                // OCR is applied only when configured and only to pages that
                // yielded no extractable text — never re-OCR pages that
                // already have text.
                text = self.ocr.ocr_page(path, idx as u32)?;
            }
            page_texts.insert(idx as u32, text);
        }

        let metadata = DocumentMetadata {
            page_count: pages.len() as u32,
            title: None,
            language: None,
            creator: None,
        };

        Ok(ExtractedDocument {
            page_texts,
            metadata,
            structured_texts: None,
        })
    }
}

/// Decompress a transparently-gzipped `.pdfz` to a temp file; if the
/// "compressed" file already starts with the `%PDF` magic, it is treated as
/// a plain PDF.
pub fn materialize_pdf_path(path: &Path) -> Result<std::path::PathBuf> {
    let is_pdfz = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdfz"));

    if !is_pdfz {
        return Ok(path.to_path_buf());
    }

    let bytes = std::fs::read(path)?;
    if bytes.starts_with(b"%PDF") {
        return Ok(path.to_path_buf());
    }

    use std::io::Read;
    let mut decoder = flate2_gzip_decoder(&bytes)?;
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Pdf(format!("failed to decompress .pdfz: {e}")))?;

    let mut tmp = tempfile_path(path)?;
    std::fs::write(&tmp, &decompressed)?;
    tmp.set_extension("pdf");
    Ok(tmp)
}

fn flate2_gzip_decoder(bytes: &[u8]) -> Result<impl std::io::Read + '_> {
    Ok(flate2::read::GzDecoder::new(bytes))
}

fn tempfile_path(original: &Path) -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir();
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    Ok(dir.join(format!("{stem}-{}.pdf", uuid::Uuid::new_v4())))
}
