//! Search Indexing (stage 15): a finalization stage with no extraction
//! of its own — it counts what earlier stages produced, flips
//! `documents.search_ready`, and logs an analytics row.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCounts {
    pub chunks: u64,
    pub embeddings: u64,
    pub links: u64,
    pub videos: u64,
}

#[async_trait]
pub trait SearchIndexCounts: Send + Sync {
    async fn counts(&self, document_id: Uuid) -> Result<DocumentCounts>;
}

#[async_trait]
pub trait DocumentReadinessStore: Send + Sync {
    async fn set_search_ready(&self, document_id: Uuid, ready: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct IndexingAnalyticsRow {
    pub document_id: Uuid,
    pub indexed_at: DateTime<Utc>,
    pub counts: DocumentCounts,
    pub processing_time_s: f64,
}

#[async_trait]
pub trait IndexingAnalyticsSink: Send + Sync {
    async fn record(&self, row: IndexingAnalyticsRow) -> Result<()>;
}

pub struct SearchIndexingStage {
    counts: Arc<dyn SearchIndexCounts>,
    readiness: Arc<dyn DocumentReadinessStore>,
    analytics: Arc<dyn IndexingAnalyticsSink>,
}

impl SearchIndexingStage {
    #[must_use]
    pub fn new(counts: Arc<dyn SearchIndexCounts>, readiness: Arc<dyn DocumentReadinessStore>, analytics: Arc<dyn IndexingAnalyticsSink>) -> Self {
        Self { counts, readiness, analytics }
    }
}

#[async_trait]
impl Processor for SearchIndexingStage {
    fn name(&self) -> &'static str {
        "search_indexing"
    }

    fn stage(&self) -> Stage {
        Stage::SearchIndexing
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["documents", "indexing_analytics"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let started = std::time::Instant::now();
        let counts = self.counts.counts(context.document_id).await?;
        let search_ready = counts.embeddings > 0;
        self.readiness.set_search_ready(context.document_id, search_ready).await?;

        self.analytics
            .record(IndexingAnalyticsRow {
                document_id: context.document_id,
                indexed_at: Utc::now(),
                counts,
                processing_time_s: started.elapsed().as_secs_f64(),
            })
            .await?;

        let mut data = HashMap::new();
        data.insert("chunks".to_string(), serde_json::json!(counts.chunks));
        data.insert("embeddings".to_string(), serde_json::json!(counts.embeddings));
        data.insert("links".to_string(), serde_json::json!(counts.links));
        data.insert("videos".to_string(), serde_json::json!(counts.videos));
        data.insert("search_ready".to_string(), serde_json::json!(search_ready));

        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}
