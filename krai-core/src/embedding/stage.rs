//! Embedding Stage: embeds chunks, tables and image contexts into
//! `unified_embeddings`, batching requests to the model server under an
//! adaptive batch size.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::embedding::batch::AdaptiveBatcher;
use crate::error::{Error, Result};
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, SourceType, Stage, UnifiedEmbedding};

/// The model server's embedding RPC: one HTTP round trip per batch.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Durable storage for embeddings, with the existence check idempotency
/// relies on.
#[async_trait]
pub trait EmbeddingSink: Send + Sync {
    async fn exists(&self, source_id: Uuid, source_type: SourceType) -> Result<bool>;
    async fn insert(&self, embedding: UnifiedEmbedding) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct EmbeddingConfig {
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub request_timeout: std::time::Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 100,
            min_batch_size: 5,
            max_batch_size: 200,
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

struct EmbeddingSource {
    source_id: Uuid,
    source_type: SourceType,
    text: String,
}

/// Consecutive resource-limited/timeout responses at the floor batch size
/// before the stage gives up and surfaces the error to the hybrid retry
/// policy at the stage level.
const MAX_STUCK_ATTEMPTS: u32 = 5;

pub struct EmbeddingStage {
    model: Arc<dyn ModelClient>,
    sink: Arc<dyn EmbeddingSink>,
    batcher: Mutex<AdaptiveBatcher>,
}

impl EmbeddingStage {
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>, sink: Arc<dyn EmbeddingSink>, config: EmbeddingConfig) -> Self {
        Self {
            model,
            sink,
            batcher: Mutex::new(AdaptiveBatcher::new(config.initial_batch_size, config.min_batch_size, config.max_batch_size)),
        }
    }

    fn collect_sources(context: &ProcessingContext) -> Vec<EmbeddingSource> {
        let mut sources = Vec::new();

        for chunk in context.chunks.iter().flatten() {
            sources.push(EmbeddingSource { source_id: chunk.id, source_type: SourceType::Text, text: chunk.text.clone() });
        }
        for table in context.tables.iter().flatten() {
            sources.push(EmbeddingSource { source_id: table.id, source_type: SourceType::Table, text: table.markdown.clone() });
        }
        for image in context.images.iter().flatten() {
            if let Some(caption) = &image.context_caption {
                sources.push(EmbeddingSource { source_id: image.id, source_type: SourceType::Context, text: caption.clone() });
            }
        }

        sources
    }

    async fn pending(&self, sources: Vec<EmbeddingSource>) -> Result<Vec<EmbeddingSource>> {
        let mut pending = Vec::with_capacity(sources.len());
        for source in sources {
            if !self.sink.exists(source.source_id, source.source_type).await? {
                pending.push(source);
            }
        }
        Ok(pending)
    }
}

fn is_resource_related(error: &Error) -> bool {
    matches!(error, Error::ResourceLimited(_) | Error::Timeout(_))
}

#[async_trait]
impl Processor for EmbeddingStage {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn stage(&self) -> Stage {
        Stage::Embedding
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["unified_embeddings"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let sources = Self::collect_sources(context);
        let total_candidates = sources.len() as u64;
        let pending = self.pending(sources).await?;
        let skipped = total_candidates - pending.len() as u64;

        let mut embedded = 0u64;
        let mut idx = 0usize;
        let mut stuck_attempts = 0u32;

        while idx < pending.len() {
            let size = self.batcher.lock().await.batch_size();
            let end = (idx + size).min(pending.len());
            let batch = &pending[idx..end];
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();

            match self.model.embed_batch(&texts).await {
                Ok(vectors) => {
                    self.batcher.lock().await.record_success();
                    stuck_attempts = 0;
                    for (source, vector) in batch.iter().zip(vectors) {
                        let embedding = UnifiedEmbedding::new(context.document_id, source.source_id, source.source_type, vector);
                        self.sink.insert(embedding).await?;
                        embedded += 1;
                    }
                    idx = end;
                }
                Err(e) if is_resource_related(&e) => {
                    self.batcher.lock().await.record_resource_limited();
                    stuck_attempts += 1;
                    if stuck_attempts >= MAX_STUCK_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let mut data = HashMap::new();
        data.insert("embedded".to_string(), serde_json::json!(embedded));
        data.insert("skipped_already_embedded".to_string(), serde_json::json!(skipped));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct FixedModel;

    #[async_trait]
    impl ModelClient for FixedModel {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1_f32; crate::types::EMBEDDING_DIM]).collect())
        }
    }

    struct FlakyModel {
        remaining_failures: StdMutex<u32>,
    }

    #[async_trait]
    impl ModelClient for FlakyModel {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::ResourceLimited("model server busy".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.2_f32; crate::types::EMBEDDING_DIM]).collect())
        }
    }

    struct InMemorySink {
        seen: StdMutex<HashSet<(Uuid, SourceType)>>,
    }

    impl InMemorySink {
        fn new() -> Self {
            Self { seen: StdMutex::new(HashSet::new()) }
        }
    }

    #[async_trait]
    impl EmbeddingSink for InMemorySink {
        async fn exists(&self, source_id: Uuid, source_type: SourceType) -> Result<bool> {
            Ok(self.seen.lock().unwrap().contains(&(source_id, source_type)))
        }
        async fn insert(&self, embedding: UnifiedEmbedding) -> Result<()> {
            self.seen.lock().unwrap().insert((embedding.source_id, embedding.source_type));
            Ok(())
        }
    }

    fn context_with_chunks(n: usize) -> ProcessingContext {
        let document_id = Uuid::new_v4();
        let mut ctx = ProcessingContext::new(document_id, Stage::Embedding);
        ctx.chunks = Some((0..n).map(|i| Chunk::new(document_id, i as u32, format!("chunk {i}"), 0, 0)).collect());
        ctx
    }

    #[tokio::test]
    async fn embeds_every_chunk_once() {
        let sink = Arc::new(InMemorySink::new());
        let stage = EmbeddingStage::new(Arc::new(FixedModel), sink.clone(), EmbeddingConfig::default());
        let mut ctx = context_with_chunks(7);
        let result = stage.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["embedded"], serde_json::json!(7));
        assert_eq!(sink.seen.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn already_embedded_sources_are_skipped() {
        let sink = Arc::new(InMemorySink::new());
        let document_id = Uuid::new_v4();
        let mut ctx = ProcessingContext::new(document_id, Stage::Embedding);
        let chunk = Chunk::new(document_id, 0, "already done".to_string(), 0, 0);
        sink.seen.lock().unwrap().insert((chunk.id, SourceType::Text));
        ctx.chunks = Some(vec![chunk]);

        let stage = EmbeddingStage::new(Arc::new(FixedModel), sink.clone(), EmbeddingConfig::default());
        let result = stage.process(&mut ctx).await.unwrap();
        assert_eq!(result.data["embedded"], serde_json::json!(0));
        assert_eq!(result.data["skipped_already_embedded"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn shrinks_batch_size_and_recovers_from_resource_limits() {
        let sink = Arc::new(InMemorySink::new());
        let model = Arc::new(FlakyModel { remaining_failures: StdMutex::new(2) });
        let config = EmbeddingConfig {
            initial_batch_size: 10,
            min_batch_size: 2,
            max_batch_size: 20,
            ..EmbeddingConfig::default()
        };
        let stage = EmbeddingStage::new(model, sink.clone(), config);
        let mut ctx = context_with_chunks(5);
        let result = stage.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(sink.seen.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn persistent_resource_limits_surface_as_an_error() {
        let sink = Arc::new(InMemorySink::new());
        let model = Arc::new(FlakyModel { remaining_failures: StdMutex::new(1000) });
        let stage = EmbeddingStage::new(model, sink, EmbeddingConfig::default());
        let mut ctx = context_with_chunks(3);
        let result = stage.process(&mut ctx).await;
        assert!(result.is_err());
    }
}
