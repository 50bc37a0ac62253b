//! Search Indexing and the Multimodal Search Service.

mod index;
mod multimodal;

pub use index::{
    DocumentCounts, DocumentReadinessStore, IndexingAnalyticsRow, IndexingAnalyticsSink, SearchIndexCounts,
    SearchIndexingStage,
};
pub use multimodal::{
    AnswerGenerator, DocumentInfo, DocumentInfoLookup, EnrichedImageResult, EnrichedResult, HealthStatus,
    ImageContextSearchResponse, ImageSearchResult, MultimodalSearchResponse, MultimodalSearchService, QueryEmbedder,
    TwoStageSearchResponse, TwoStageTiming, VectorSearchBackend, VectorSearchResult, DEFAULT_RESULT_LIMIT,
    DEFAULT_SIMILARITY_THRESHOLD, EXPANDED_QUERY_ANSWER_CHARS, TWO_STAGE_THRESHOLD,
};
