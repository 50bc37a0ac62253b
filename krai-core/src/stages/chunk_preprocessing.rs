//! Chunk Preprocessing (stage 7): turns `context.page_texts` into the
//! ordered, linked [`crate::types::Chunk`] sequence every later stage reads.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use crate::chunker::SmartChunker;
use crate::error::{Error, Result};
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, Stage};

pub struct ChunkPreprocessingProcessor {
    chunker: SmartChunker,
}

impl ChunkPreprocessingProcessor {
    #[must_use]
    pub fn new(chunker: SmartChunker) -> Self {
        Self { chunker }
    }
}

#[async_trait]
impl Processor for ChunkPreprocessingProcessor {
    fn name(&self) -> &'static str {
        "chunk_preprocessing"
    }

    fn stage(&self) -> Stage {
        Stage::ChunkPreprocessing
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["page_texts"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["chunks"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let page_texts = context
            .page_texts
            .as_ref()
            .ok_or_else(|| Error::MissingInput("page_texts".to_string()))?;
        let ordered: BTreeMap<u32, String> = page_texts.iter().map(|(p, t)| (*p, t.clone())).collect();

        let chunks = self.chunker.chunk_document(context.document_id, &ordered);
        let chunk_count = chunks.len();
        context.chunks = Some(chunks);

        let mut data = HashMap::new();
        data.insert("chunk_count".to_string(), serde_json::json!(chunk_count));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}
