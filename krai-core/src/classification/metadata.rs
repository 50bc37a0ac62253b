//! Metadata Extraction (stage 10): pulls error/fault codes out of each
//! chunk using the manufacturer pattern catalogue, classifies their
//! severity, and records whether the fix looks like it needs a technician
//! or replacement parts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::patterns;
use crate::processor::Processor;
use crate::types::{Chunk, ErrorCode, ExtractionMethod, ProcessingContext, ProcessingResult, Severity, Stage};

/// Confidence assigned to a regex-matched code; the original LLM-assisted
/// path would score higher, but no LLM-based metadata extractor is wired
/// here (see [`crate::classification::ClassificationLlm`] for the one LLM
/// seam this pipeline does use).
pub const REGEX_MATCH_CONFIDENCE: f32 = 0.75;

const CRITICAL_KEYWORDS: &[&str] = &["fire", "electric shock", "smoke", "burn"];
const HIGH_KEYWORDS: &[&str] = &["fuser", "high voltage", "laser unit"];
const TECHNICIAN_KEYWORDS: &[&str] = &["technician", "service call", "qualified personnel", "contact support"];
const PARTS_KEYWORDS: &[&str] = &["replace", "part number", "order a new", "install a new"];

/// Where extracted error codes are durably written. Mirrors the original's
/// dual database-adapter-or-fallback write path: when no sink is wired the
/// stage logs and reports zero codes written rather than failing, since an
/// extraction stage degrading to a no-op write target is not itself an
/// extraction failure.
#[async_trait]
pub trait ErrorCodeSink: Send + Sync {
    async fn write_error_code(&self, code: ErrorCode) -> Result<Uuid>;
}

fn classify_severity(context_text: &str) -> Severity {
    let lower = context_text.to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Severity::Critical
    } else if HIGH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn requires_technician(context_text: &str) -> bool {
    let lower = context_text.to_lowercase();
    TECHNICIAN_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn requires_parts(context_text: &str) -> bool {
    let lower = context_text.to_lowercase();
    PARTS_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Extract every [`ErrorCode`] found in `chunk`'s text, using its leading
/// sentence as the description and the rest of the chunk as a candidate
/// solution.
#[must_use]
pub fn extract_from_chunk(document_id: Uuid, chunk: &Chunk) -> Vec<ErrorCode> {
    let codes = patterns::all_error_codes(&chunk.text);
    if codes.is_empty() {
        return Vec::new();
    }

    let description = chunk
        .text
        .split(['.', '\n'])
        .find(|s| !s.trim().is_empty())
        .unwrap_or(&chunk.text)
        .trim()
        .to_string();

    codes
        .into_iter()
        .map(|code| ErrorCode {
            id: Uuid::new_v4(),
            document_id,
            chunk_id: Some(chunk.id),
            code,
            description: description.clone(),
            solution: (chunk.text.len() > description.len()).then(|| chunk.text.clone()),
            page_number: chunk.page_start,
            confidence: REGEX_MATCH_CONFIDENCE,
            severity: classify_severity(&chunk.text),
            extraction_method: ExtractionMethod::Regex,
            requires_technician: requires_technician(&chunk.text),
            requires_parts: requires_parts(&chunk.text),
        })
        .collect()
}

pub struct MetadataExtractionProcessor {
    sink: Option<Arc<dyn ErrorCodeSink>>,
}

impl MetadataExtractionProcessor {
    #[must_use]
    pub fn new(sink: Option<Arc<dyn ErrorCodeSink>>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Processor for MetadataExtractionProcessor {
    fn name(&self) -> &'static str {
        "metadata_extraction"
    }

    fn stage(&self) -> Stage {
        Stage::MetadataExtraction
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["chunks"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["error_codes"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let chunks = context.chunks.clone().unwrap_or_default();
        let mut written = 0u64;
        let mut all_codes = Vec::new();

        for chunk in &chunks {
            let codes = extract_from_chunk(context.document_id, chunk);
            if let Some(sink) = &self.sink {
                for code in &codes {
                    if let Err(e) = sink.write_error_code(code.clone()).await {
                        tracing::warn!(error = %e, "failed to persist an extracted error code");
                        continue;
                    }
                    written += 1;
                }
            }
            all_codes.extend(codes);
        }

        let found = all_codes.len() as u64;
        if self.sink.is_none() && found > 0 {
            tracing::warn!(found, "no error code sink wired, found codes were not persisted");
        }
        context.error_codes = Some(all_codes);

        let mut data = HashMap::new();
        data.insert("error_codes_found".to_string(), serde_json::json!(found));
        data.insert("error_codes_written".to_string(), serde_json::json!(written));

        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn chunk_with(text: &str) -> Chunk {
        Chunk::new(Uuid::new_v4(), 0, text.to_string(), 3, 3)
    }

    #[test]
    fn extracts_code_with_description_and_solution() {
        let chunk = chunk_with("Error 900.01 fuser unit overheating.\nReplace fuser unit (part number FM1-2345-000).");
        let codes = extract_from_chunk(Uuid::new_v4(), &chunk);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "900.01");
        assert!(codes[0].requires_parts);
        assert_eq!(codes[0].severity, Severity::High);
    }

    #[test]
    fn chunk_without_a_code_yields_nothing() {
        let chunk = chunk_with("General maintenance notes with no fault codes present.");
        assert!(extract_from_chunk(Uuid::new_v4(), &chunk).is_empty());
    }

    struct RecordingSink(Mutex<Vec<ErrorCode>>);

    #[async_trait]
    impl ErrorCodeSink for RecordingSink {
        async fn write_error_code(&self, code: ErrorCode) -> Result<Uuid> {
            let id = code.id;
            self.0.lock().unwrap().push(code);
            Ok(id)
        }
    }

    #[tokio::test]
    async fn processor_writes_through_the_sink() {
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let processor = MetadataExtractionProcessor::new(Some(sink.clone() as Arc<dyn ErrorCodeSink>));
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::MetadataExtraction);
        ctx.chunks = Some(vec![chunk_with("Error E042 sensor fault, contact support.")]);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn processor_without_a_sink_does_not_fail() {
        let processor = MetadataExtractionProcessor::new(None);
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::MetadataExtraction);
        ctx.chunks = Some(vec![chunk_with("Error E042 sensor fault.")]);
        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
    }
}
