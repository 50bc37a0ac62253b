//! Search-indexing finalization counts/readiness/analytics, plus the naive
//! in-process vector search fallback (no native vector index in this
//! adapter — cosine similarity is computed over every row in
//! `unified_embeddings`, mirroring the non-indexed fallback path the
//! teacher's search module takes when no native vector extension is
//! present).

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::search::{
    DocumentCounts, DocumentInfo, DocumentInfoLookup, DocumentReadinessStore, ImageSearchResult, IndexingAnalyticsRow,
    IndexingAnalyticsSink, SearchIndexCounts, VectorSearchBackend, VectorSearchResult,
};
use krai_core::types::SourceType;

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlSearchIndexCounts {
    store: LibsqlStore,
}

impl LibsqlSearchIndexCounts {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }

    async fn count(&self, table: &str, document_id: Uuid) -> Result<u64> {
        let conn = self.store.connection()?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE document_id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![document_id.to_string()])
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let row = rows.next().await.map_err(|e| Error::Storage(e.to_string()))?;
        let count: i64 = row.map_or(Ok(0), |r| r.get(0)).map_err(|e: libsql::Error| Error::Storage(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl SearchIndexCounts for LibsqlSearchIndexCounts {
    async fn counts(&self, document_id: Uuid) -> Result<DocumentCounts> {
        Ok(DocumentCounts {
            chunks: self.count("chunks", document_id).await?,
            embeddings: self.count("unified_embeddings", document_id).await?,
            links: self.count("links", document_id).await?,
            videos: self.count("videos", document_id).await?,
        })
    }
}

pub struct LibsqlDocumentReadinessStore {
    store: LibsqlStore,
}

impl LibsqlDocumentReadinessStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DocumentReadinessStore for LibsqlDocumentReadinessStore {
    async fn set_search_ready(&self, document_id: Uuid, ready: bool) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "UPDATE documents SET search_ready = ? WHERE id = ?",
            libsql::params![ready, document_id.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "documents", document_id.to_string()))?;
        Ok(())
    }
}

pub struct LibsqlIndexingAnalyticsSink {
    store: LibsqlStore,
}

impl LibsqlIndexingAnalyticsSink {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IndexingAnalyticsSink for LibsqlIndexingAnalyticsSink {
    async fn record(&self, row: IndexingAnalyticsRow) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO search_analytics (document_id, indexed_at, chunks, embeddings, links, videos, processing_time_s)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                row.document_id.to_string(),
                row.indexed_at.to_rfc3339(),
                row.counts.chunks,
                row.counts.embeddings,
                row.counts.links,
                row.counts.videos,
                row.processing_time_s,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "search_analytics", row.document_id.to_string()))?;
        Ok(())
    }
}

pub struct LibsqlDocumentInfoLookup {
    store: LibsqlStore,
}

impl LibsqlDocumentInfoLookup {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }

    async fn lookup_by_document_id(&self, document_id: Uuid) -> Result<Option<DocumentInfo>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT filename, manufacturer FROM documents WHERE id = ?",
                libsql::params![document_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let name: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let manufacturer: Option<String> = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Some(DocumentInfo { name, manufacturer }))
    }
}

#[async_trait]
impl DocumentInfoLookup for LibsqlDocumentInfoLookup {
    async fn lookup_by_source(&self, source_id: Uuid, source_type: SourceType) -> Result<Option<DocumentInfo>> {
        let table = match source_type {
            SourceType::Text | SourceType::Context => "chunks",
            SourceType::Image => "images",
            SourceType::Table => "structured_tables",
        };
        let conn = self.store.connection()?;
        let sql = format!("SELECT document_id FROM {table} WHERE id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![source_id.to_string()])
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let document_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let document_id = Uuid::parse_str(&document_id).map_err(|e| Error::Storage(e.to_string()))?;
        self.lookup_by_document_id(document_id).await
    }

    async fn lookup_by_image(&self, image_id: Uuid) -> Result<Option<DocumentInfo>> {
        self.lookup_by_source(image_id, SourceType::Image).await
    }
}

pub struct LibsqlVectorSearchBackend {
    store: LibsqlStore,
}

impl LibsqlVectorSearchBackend {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn source_type_from_str(s: &str) -> Option<SourceType> {
    match s {
        "text" => Some(SourceType::Text),
        "image" => Some(SourceType::Image),
        "table" => Some(SourceType::Table),
        "context" => Some(SourceType::Context),
        _ => None,
    }
}

impl LibsqlVectorSearchBackend {
    async fn content_for(&self, source_id: Uuid, source_type: SourceType) -> Result<String> {
        let conn = self.store.connection()?;
        let (table, column) = match source_type {
            SourceType::Text | SourceType::Context => ("chunks", "text"),
            SourceType::Image => ("images", "context_caption"),
            SourceType::Table => ("structured_tables", "markdown"),
        };
        let sql = format!("SELECT {column} FROM {table} WHERE id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![source_id.to_string()])
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(String::new());
        };
        Ok(row.get::<Option<String>>(0).map_err(|e| Error::Storage(e.to_string()))?.unwrap_or_default())
    }
}

#[async_trait]
impl VectorSearchBackend for LibsqlVectorSearchBackend {
    async fn match_multimodal(&self, query_embedding: &[f32], threshold: f32, limit: usize) -> Result<Vec<VectorSearchResult>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query("SELECT source_id, source_type, vector FROM unified_embeddings", ())
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut scored = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let source_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let source_type: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let vector: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let Some(source_type) = source_type_from_str(&source_type) else { continue };
            let vector: Vec<f32> = serde_json::from_str(&vector).map_err(Error::Serialization)?;
            let similarity = cosine_similarity(query_embedding, &vector);
            if similarity >= threshold {
                let source_id = Uuid::parse_str(&source_id).map_err(|e| Error::Storage(e.to_string()))?;
                scored.push((source_id, source_type, similarity));
            }
        }
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (source_id, source_type, similarity) in scored {
            let content = self.content_for(source_id, source_type).await?;
            results.push(VectorSearchResult { source_id, source_type, content, similarity });
        }
        Ok(results)
    }

    async fn match_images_by_context(&self, query_embedding: &[f32], threshold: f32, limit: usize) -> Result<Vec<ImageSearchResult>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT source_id, vector FROM unified_embeddings WHERE source_type = 'image'",
                (),
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut scored = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let source_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let vector: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let vector: Vec<f32> = serde_json::from_str(&vector).map_err(Error::Serialization)?;
            let similarity = cosine_similarity(query_embedding, &vector);
            if similarity >= threshold {
                let source_id = Uuid::parse_str(&source_id).map_err(|e| Error::Storage(e.to_string()))?;
                scored.push((source_id, similarity));
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for (image_id, similarity) in scored {
            let mut image_rows = conn
                .query(
                    "SELECT storage_url, context_caption FROM images WHERE id = ?",
                    libsql::params![image_id.to_string()],
                )
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            let Some(image_row) = image_rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
                continue;
            };
            let storage_url: String = image_row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let context_caption: Option<String> = image_row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            results.push(ImageSearchResult { image_id, storage_url, context_caption, similarity });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> LibsqlStore {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        store
    }

    async fn insert_chunk(store: &LibsqlStore, id: Uuid, document_id: Uuid, text: &str) {
        let conn = store.connection().unwrap();
        conn.execute(
            "INSERT INTO chunks (id, document_id, chunk_index, text, fingerprint, page_start, page_end, chunk_type, metadata)
             VALUES (?, ?, 0, ?, ?, 1, 1, 'text', '{}')",
            libsql::params![id.to_string(), document_id.to_string(), text.to_string(), id.to_string()],
        )
        .await
        .unwrap();
    }

    async fn insert_embedding(store: &LibsqlStore, document_id: Uuid, source_id: Uuid, source_type: &str, vector: Vec<f32>) {
        let conn = store.connection().unwrap();
        conn.execute(
            "INSERT INTO unified_embeddings (id, document_id, source_id, source_type, vector, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                Uuid::new_v4().to_string(),
                document_id.to_string(),
                source_id.to_string(),
                source_type.to_string(),
                serde_json::to_string(&vector).unwrap(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn counts_reflect_document_scoped_rows() {
        let store = fixture().await;
        let document_id = Uuid::new_v4();
        let chunk_id = Uuid::new_v4();
        insert_chunk(&store, chunk_id, document_id, "hello").await;
        insert_embedding(&store, document_id, chunk_id, "text", vec![1.0; 768]).await;

        let counts = LibsqlSearchIndexCounts::new(store).counts(document_id).await.unwrap();
        assert_eq!(counts.chunks, 1);
        assert_eq!(counts.embeddings, 1);
        assert_eq!(counts.links, 0);
    }

    #[tokio::test]
    async fn match_multimodal_ranks_by_similarity_and_resolves_content() {
        let store = fixture().await;
        let document_id = Uuid::new_v4();
        let exact_match = Uuid::new_v4();
        let orthogonal = Uuid::new_v4();
        insert_chunk(&store, exact_match, document_id, "fuser unit replacement").await;
        insert_chunk(&store, orthogonal, document_id, "network configuration").await;

        let mut query = vec![0.0f32; 768];
        query[0] = 1.0;
        insert_embedding(&store, document_id, exact_match, "text", query.clone()).await;
        let mut orthogonal_vector = vec![0.0f32; 768];
        orthogonal_vector[1] = 1.0;
        insert_embedding(&store, document_id, orthogonal, "text", orthogonal_vector).await;

        let backend = LibsqlVectorSearchBackend::new(store);
        let results = backend.match_multimodal(&query, 0.5, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_id, exact_match);
        assert_eq!(results[0].content, "fuser unit replacement");
    }

    #[tokio::test]
    async fn set_search_ready_flips_the_flag() {
        let store = fixture().await;
        let document_id = Uuid::new_v4();
        let conn = store.connection().unwrap();
        conn.execute(
            "INSERT INTO documents (id, file_hash, filename, size, document_type, status, search_ready, created_at, updated_at)
             VALUES (?, ?, 'manual.pdf', 100, 'manual', 'processing', 0, ?, ?)",
            libsql::params![document_id.to_string(), "hash".to_string(), chrono::Utc::now().to_rfc3339(), chrono::Utc::now().to_rfc3339()],
        )
        .await
        .unwrap();

        let readiness = LibsqlDocumentReadinessStore::new(store.clone());
        readiness.set_search_ready(document_id, true).await.unwrap();

        let lookup = LibsqlDocumentInfoLookup::new(store);
        let info = lookup.lookup_by_document_id(document_id).await.unwrap().unwrap();
        assert_eq!(info.name, "manual.pdf");
    }

    #[tokio::test]
    async fn analytics_sink_records_a_row() {
        let store = fixture().await;
        let sink = LibsqlIndexingAnalyticsSink::new(store.clone());
        let document_id = Uuid::new_v4();
        sink.record(IndexingAnalyticsRow {
            document_id,
            indexed_at: chrono::Utc::now(),
            counts: DocumentCounts { chunks: 3, embeddings: 3, links: 1, videos: 0 },
            processing_time_s: 1.2,
        })
        .await
        .unwrap();

        let conn = store.connection().unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM search_analytics", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 1);
    }
}
