//! Multimodal Search Service: unified search across every source
//! type, context-aware image search, and the two-stage text-then-image
//! retrieval path for underspecified "show me the diagram for…" queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::SourceType;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;
pub const DEFAULT_RESULT_LIMIT: usize = 10;
pub const TWO_STAGE_THRESHOLD: f32 = 0.6;
pub const EXPANDED_QUERY_ANSWER_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub name: String,
    pub manufacturer: Option<String>,
}

/// Resolves the document a search hit belongs to, for result enrichment.
#[async_trait]
pub trait DocumentInfoLookup: Send + Sync {
    async fn lookup_by_source(&self, source_id: Uuid, source_type: SourceType) -> Result<Option<DocumentInfo>>;
    async fn lookup_by_image(&self, image_id: Uuid) -> Result<Option<DocumentInfo>>;
}

#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub source_id: Uuid,
    pub source_type: SourceType,
    pub content: String,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct EnrichedResult {
    pub source_id: Uuid,
    pub source_type: SourceType,
    pub content: String,
    pub similarity: f32,
    pub document_name: Option<String>,
    pub manufacturer: Option<String>,
    pub display_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct ImageSearchResult {
    pub image_id: Uuid,
    pub storage_url: String,
    pub context_caption: Option<String>,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct EnrichedImageResult {
    pub image_id: Uuid,
    pub storage_url: String,
    pub thumbnail_url: String,
    pub context_caption: Option<String>,
    pub similarity: f32,
    pub document_name: Option<String>,
    pub manufacturer: Option<String>,
}

/// The server-side vector RPC seam (`match_multimodal` / `match_images_by_context`).
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    async fn match_multimodal(&self, query_embedding: &[f32], threshold: f32, limit: usize) -> Result<Vec<VectorSearchResult>>;
    async fn match_images_by_context(&self, query_embedding: &[f32], threshold: f32, limit: usize) -> Result<Vec<ImageSearchResult>>;
}

/// Embeds a query string. A thin wrapper over the same model server the
/// Embedding Stage uses, scoped to a single string at a time.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}

/// The LLM text-generation seam used to produce a short answer from
/// retrieved chunks during two-stage retrieval.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct MultimodalSearchResponse {
    pub query: String,
    pub results: Vec<EnrichedResult>,
    pub results_by_modality: HashMap<SourceType, Vec<EnrichedResult>>,
    pub total_count: usize,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct ImageContextSearchResponse {
    pub query: String,
    pub images: Vec<EnrichedImageResult>,
    pub total_count: usize,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct TwoStageTiming {
    pub stage1_ms: f64,
    pub stage2_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone)]
pub struct TwoStageSearchResponse {
    pub query: String,
    pub answer: String,
    pub images: Vec<EnrichedImageResult>,
    pub text_sources: Vec<EnrichedResult>,
    pub expanded_query: String,
    pub timing: TwoStageTiming,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub vector_backend_ok: bool,
    pub embedder_ok: bool,
}

pub struct MultimodalSearchService {
    backend: Arc<dyn VectorSearchBackend>,
    embedder: Arc<dyn QueryEmbedder>,
    answers: Arc<dyn AnswerGenerator>,
    documents: Arc<dyn DocumentInfoLookup>,
    default_threshold: f32,
    default_limit: usize,
}

impl MultimodalSearchService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn VectorSearchBackend>,
        embedder: Arc<dyn QueryEmbedder>,
        answers: Arc<dyn AnswerGenerator>,
        documents: Arc<dyn DocumentInfoLookup>,
    ) -> Self {
        Self {
            backend,
            embedder,
            answers,
            documents,
            default_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            default_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    fn display_type(source_type: SourceType) -> &'static str {
        match source_type {
            SourceType::Image => "image",
            SourceType::Table => "table",
            SourceType::Context => "context",
            SourceType::Text => "text",
        }
    }

    async fn enrich(&self, results: Vec<VectorSearchResult>) -> Vec<EnrichedResult> {
        let mut enriched = Vec::with_capacity(results.len());
        for result in results {
            let info = self.documents.lookup_by_source(result.source_id, result.source_type).await.ok().flatten();
            enriched.push(EnrichedResult {
                source_id: result.source_id,
                source_type: result.source_type,
                content: result.content,
                similarity: result.similarity,
                document_name: info.as_ref().map(|i| i.name.clone()),
                manufacturer: info.and_then(|i| i.manufacturer),
                display_type: Self::display_type(result.source_type),
            });
        }
        enriched
    }

    async fn enrich_images(&self, results: Vec<ImageSearchResult>) -> Vec<EnrichedImageResult> {
        let mut enriched = Vec::with_capacity(results.len());
        for result in results {
            let info = self.documents.lookup_by_image(result.image_id).await.ok().flatten();
            enriched.push(EnrichedImageResult {
                image_id: result.image_id,
                thumbnail_url: result.storage_url.clone(),
                storage_url: result.storage_url,
                context_caption: result.context_caption,
                similarity: result.similarity,
                document_name: info.as_ref().map(|i| i.name.clone()),
                manufacturer: info.and_then(|i| i.manufacturer),
            });
        }
        enriched
    }

    /// Unified search across every modality, optionally filtered to a
    /// subset of [`SourceType`]s.
    pub async fn search_multimodal(
        &self,
        query: &str,
        modalities: Option<&[SourceType]>,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> Result<MultimodalSearchResponse> {
        let started = Instant::now();
        let query_embedding = self.embedder.embed_query(query).await?;
        let raw = self
            .backend
            .match_multimodal(&query_embedding, threshold.unwrap_or(self.default_threshold), limit.unwrap_or(self.default_limit))
            .await?;

        let filtered = match modalities {
            Some(allowed) => raw.into_iter().filter(|r| allowed.contains(&r.source_type)).collect(),
            None => raw,
        };
        let enriched = self.enrich(filtered).await;

        let mut results_by_modality: HashMap<SourceType, Vec<EnrichedResult>> = HashMap::new();
        for result in &enriched {
            results_by_modality.entry(result.source_type).or_default().push(result.clone());
        }

        Ok(MultimodalSearchResponse {
            query: query.to_string(),
            total_count: enriched.len(),
            results: enriched,
            results_by_modality,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Context-aware image search against image-context embeddings.
    pub async fn search_images_by_context(&self, query: &str, threshold: Option<f32>, limit: usize) -> Result<ImageContextSearchResponse> {
        let started = Instant::now();
        let query_embedding = self.embedder.embed_query(query).await?;
        let raw = self.backend.match_images_by_context(&query_embedding, threshold.unwrap_or(self.default_threshold), limit).await?;
        let images = self.enrich_images(raw).await;

        Ok(ImageContextSearchResponse {
            query: query.to_string(),
            total_count: images.len(),
            images,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Two-stage retrieval: a text-only pass feeds an LLM answer, which
    /// expands the query for an image-by-context pass. Improves image
    /// recall for underspecified "show me the diagram for…" queries.
    pub async fn search_two_stage(&self, query: &str, text_limit: usize, image_limit: usize) -> Result<TwoStageSearchResponse> {
        let total_started = Instant::now();

        let stage1_started = Instant::now();
        let text_results = self
            .search_multimodal(query, Some(&[SourceType::Text]), Some(TWO_STAGE_THRESHOLD), Some(text_limit))
            .await?;
        let context_chunks: Vec<String> = text_results.results.iter().take(text_limit).map(|r| r.content.clone()).collect();
        let answer = self.answers.generate(query, &context_chunks).await?;
        let stage1_ms = stage1_started.elapsed().as_secs_f64() * 1000.0;

        let stage2_started = Instant::now();
        let truncated_answer: String = answer.chars().take(EXPANDED_QUERY_ANSWER_CHARS).collect();
        let expanded_query = format!("{query} {truncated_answer}");
        let image_results = self.search_images_by_context(&expanded_query, Some(TWO_STAGE_THRESHOLD), image_limit).await?;
        let stage2_ms = stage2_started.elapsed().as_secs_f64() * 1000.0;

        Ok(TwoStageSearchResponse {
            query: query.to_string(),
            answer,
            images: image_results.images,
            text_sources: text_results.results,
            expanded_query,
            timing: TwoStageTiming { stage1_ms, stage2_ms, total_ms: total_started.elapsed().as_secs_f64() * 1000.0 },
        })
    }

    pub async fn health_check(&self) -> HealthStatus {
        let test_embedding = vec![0.1_f32; crate::types::EMBEDDING_DIM];
        let vector_backend_ok = self.backend.match_multimodal(&test_embedding, DEFAULT_SIMILARITY_THRESHOLD, 1).await.is_ok();
        let embedder_ok = self.embedder.embed_query("health check").await.is_ok();
        HealthStatus { healthy: vector_backend_ok && embedder_ok, vector_backend_ok, embedder_ok }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend;

    #[async_trait]
    impl VectorSearchBackend for FakeBackend {
        async fn match_multimodal(&self, _query_embedding: &[f32], _threshold: f32, _limit: usize) -> Result<Vec<VectorSearchResult>> {
            Ok(vec![
                VectorSearchResult { source_id: Uuid::new_v4(), source_type: SourceType::Text, content: "fuser replacement steps".to_string(), similarity: 0.81 },
                VectorSearchResult { source_id: Uuid::new_v4(), source_type: SourceType::Table, content: "| Part | Qty |".to_string(), similarity: 0.72 },
            ])
        }
        async fn match_images_by_context(&self, _query_embedding: &[f32], _threshold: f32, _limit: usize) -> Result<Vec<ImageSearchResult>> {
            Ok(vec![ImageSearchResult {
                image_id: Uuid::new_v4(),
                storage_url: "https://example/fuser.png".to_string(),
                context_caption: Some("Fuser assembly diagram".to_string()),
                similarity: 0.77,
            }])
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl QueryEmbedder for FakeEmbedder {
        async fn embed_query(&self, _query: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0_f32; crate::types::EMBEDDING_DIM])
        }
    }

    struct FakeAnswers;

    #[async_trait]
    impl AnswerGenerator for FakeAnswers {
        async fn generate(&self, _prompt: &str, _context: &[String]) -> Result<String> {
            Ok("Replace the fuser unit per the diagram on page 42.".to_string())
        }
    }

    struct NoopDocuments;

    #[async_trait]
    impl DocumentInfoLookup for NoopDocuments {
        async fn lookup_by_source(&self, _source_id: Uuid, _source_type: SourceType) -> Result<Option<DocumentInfo>> {
            Ok(None)
        }
        async fn lookup_by_image(&self, _image_id: Uuid) -> Result<Option<DocumentInfo>> {
            Ok(None)
        }
    }

    fn service() -> MultimodalSearchService {
        MultimodalSearchService::new(Arc::new(FakeBackend), Arc::new(FakeEmbedder), Arc::new(FakeAnswers), Arc::new(NoopDocuments))
    }

    #[tokio::test]
    async fn unified_search_groups_by_modality() {
        let response = service().search_multimodal("fuser error", None, None, None).await.unwrap();
        assert_eq!(response.total_count, 2);
        assert!(response.results_by_modality.contains_key(&SourceType::Text));
        assert!(response.results_by_modality.contains_key(&SourceType::Table));
    }

    #[tokio::test]
    async fn modality_filter_narrows_results() {
        let response = service().search_multimodal("fuser error", Some(&[SourceType::Text]), None, None).await.unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.results[0].source_type, SourceType::Text);
    }

    #[tokio::test]
    async fn two_stage_search_expands_query_with_truncated_answer() {
        let response = service().search_two_stage("show me the fuser diagram", 5, 5).await.unwrap();
        assert!(response.expanded_query.starts_with("show me the fuser diagram "));
        assert_eq!(response.images.len(), 1);
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn health_check_reports_all_dependencies_ok() {
        let status = service().health_check().await;
        assert!(status.healthy);
        assert!(status.vector_backend_ok);
        assert!(status.embedder_ok);
    }
}
