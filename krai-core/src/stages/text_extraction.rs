//! Text Extraction (stage 2): materializes `.pdfz` inputs, extracts per-page
//! text (with optional OCR fallback), and hands the result forward as
//! `context.page_texts` for every downstream stage to read.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::extraction::{materialize_pdf_path, PdfTextExtractor};
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, Stage};

pub struct TextExtractionProcessor {
    extractor: Arc<dyn PdfTextExtractor>,
}

impl TextExtractionProcessor {
    #[must_use]
    pub fn new(extractor: Arc<dyn PdfTextExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Processor for TextExtractionProcessor {
    fn name(&self) -> &'static str {
        "text_extraction"
    }

    fn stage(&self) -> Stage {
        Stage::TextExtraction
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["file_path"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let raw_path = context
            .file_path
            .as_deref()
            .ok_or_else(|| Error::MissingInput("file_path".to_string()))?;
        let path = materialize_pdf_path(std::path::Path::new(raw_path))?;
        let extracted = self.extractor.extract(&path)?;

        let page_count = extracted.metadata.page_count;
        context.page_texts = Some(extracted.page_texts);

        let mut data = HashMap::new();
        data.insert("page_count".to_string(), serde_json::json!(page_count));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{DocumentMetadata, ExtractedDocument};
    use uuid::Uuid;

    struct FixedExtractor;
    impl PdfTextExtractor for FixedExtractor {
        fn extract(&self, _path: &std::path::Path) -> Result<ExtractedDocument> {
            let mut page_texts = HashMap::new();
            page_texts.insert(0, "page one".to_string());
            page_texts.insert(1, "page two".to_string());
            Ok(ExtractedDocument {
                page_texts,
                metadata: DocumentMetadata { page_count: 2, ..Default::default() },
                structured_texts: None,
            })
        }
    }

    #[tokio::test]
    async fn populates_page_texts_from_the_extractor() {
        let processor = TextExtractionProcessor::new(Arc::new(FixedExtractor));
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::TextExtraction);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(ctx.page_texts.as_ref().unwrap().len(), 2);
        assert_eq!(result.data["page_count"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn missing_file_path_is_a_missing_input_error() {
        let processor = TextExtractionProcessor::new(Arc::new(FixedExtractor));
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::TextExtraction);
        assert!(processor.process(&mut ctx).await.is_err());
    }
}
