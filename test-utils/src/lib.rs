//! Shared test fixtures for the KRAI engine crates.
//!
//! Provides:
//! - In-memory implementations of every storage/cache seam in
//!   `krai_core::storage`, `krai_core::idempotency` and `krai_core::retry`
//! - Stub model clients for embedding/vision stages
//! - Builders for `ProcessingContext` and `Document`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use krai_core::embedding::{EmbeddingSink, ModelClient};
use krai_core::error::Result;
use krai_core::idempotency::CompletionMarkerStore;
use krai_core::retry::{AdvisoryLock, BackgroundRetryQueue, ScheduledRetry};
use krai_core::stages::VisionModelClient;
use krai_core::storage::{
    DocumentStore, ImageRow, LinkRow, ObjectStore, ProcessingQueueStore, PutResult, RelationalStore, UpsertOutcome,
    VideoRow,
};
use krai_core::types::{
    Document, ProcessingContext, ProcessingQueueItem, QueueItemStatus, SourceType, Stage, StageCompletionMarker,
    UnifiedEmbedding,
};

/// A fresh `ProcessingContext` for `document_id` at `stage`, with no fields
/// populated beyond what `ProcessingContext::new` sets.
#[must_use]
pub fn test_context(document_id: Uuid, stage: Stage) -> ProcessingContext {
    ProcessingContext::new(document_id, stage)
}

/// An uploaded, unclassified `Document` with a random file hash.
#[must_use]
pub fn test_document(filename: &str, size: u64) -> Document {
    Document::new(format!("hash-{}", Uuid::new_v4()), filename.to_string(), size)
}

/// A deterministic 768-wide embedding vector, filled with `seed`.
#[must_use]
pub fn test_vector(seed: f32) -> Vec<f32> {
    vec![seed; krai_core::types::EMBEDDING_DIM]
}

/// In-memory `ObjectStore`: content-addressed by `(bucket, sha256(bytes))`,
/// matching the real idempotent-PUT contract.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bucket: &str, _content_type: &str, bytes: &[u8]) -> Result<PutResult> {
        let content_hash = krai_core::idempotency::sha256_hex(bytes);
        self.objects.lock().entry((bucket.to_string(), content_hash.clone())).or_insert_with(|| bytes.to_vec());
        Ok(PutResult {
            storage_path: format!("{bucket}/{content_hash}"),
            public_url: None,
            content_hash,
        })
    }

    async fn exists(&self, bucket: &str, content_hash: &str) -> Result<bool> {
        Ok(self.objects.lock().contains_key(&(bucket.to_string(), content_hash.to_string())))
    }

    async fn public_url(&self, _bucket: &str, _content_hash: &str) -> Option<String> {
        None
    }
}

/// In-memory `DocumentStore`, deduping on `file_hash` the way a unique index
/// would.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    by_hash: Mutex<HashMap<String, Uuid>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Uuid>> {
        Ok(self.by_hash.lock().get(file_hash).copied())
    }

    async fn insert(&self, document: Document) -> Result<()> {
        let mut by_hash = self.by_hash.lock();
        if by_hash.contains_key(&document.file_hash) {
            return Err(krai_core::error::Error::UniqueViolation { table: "documents", key: document.file_hash });
        }
        by_hash.insert(document.file_hash, document.id);
        Ok(())
    }
}

/// In-memory `RelationalStore`, deduping the way each real upsert method
/// documents (image by `(document_id, file_hash)`, link by
/// `(document_id, url)`, video by `(platform, youtube_id)` or `(document_id,
/// url)`).
#[derive(Default)]
pub struct InMemoryRelationalStore {
    images: Mutex<HashMap<(Uuid, String), Uuid>>,
    links: Mutex<HashMap<(Uuid, String), Uuid>>,
    videos: Mutex<HashMap<String, Uuid>>,
}

impl InMemoryRelationalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn upsert_image(&self, row: ImageRow) -> Result<(Uuid, UpsertOutcome)> {
        let mut images = self.images.lock();
        let key = (row.document_id, row.file_hash.clone());
        if let Some(id) = images.get(&key) {
            return Ok((*id, UpsertOutcome::AlreadyExists));
        }
        let id = Uuid::new_v4();
        images.insert(key, id);
        Ok((id, UpsertOutcome::Inserted))
    }

    async fn upsert_link(&self, row: LinkRow) -> Result<(Uuid, UpsertOutcome)> {
        let mut links = self.links.lock();
        let key = (row.document_id, row.url.clone());
        if let Some(id) = links.get(&key) {
            return Ok((*id, UpsertOutcome::AlreadyExists));
        }
        let id = Uuid::new_v4();
        links.insert(key, id);
        Ok((id, UpsertOutcome::Inserted))
    }

    async fn upsert_video(&self, row: VideoRow) -> Result<(Uuid, UpsertOutcome)> {
        let mut videos = self.videos.lock();
        let key = row.youtube_id.clone().map_or_else(
            || format!("url:{}:{}", row.document_id, row.url),
            |youtube_id| format!("yt:{}:{youtube_id}", row.platform),
        );
        if let Some(id) = videos.get(&key) {
            return Ok((*id, UpsertOutcome::AlreadyExists));
        }
        let id = Uuid::new_v4();
        videos.insert(key, id);
        Ok((id, UpsertOutcome::Inserted))
    }
}

/// In-memory `ProcessingQueueStore`, preserving insertion order per
/// document the way the real queue's `pending_for_document` documents.
#[derive(Default)]
pub struct InMemoryQueueStore {
    items: Mutex<Vec<ProcessingQueueItem>>,
}

impl InMemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingQueueStore for InMemoryQueueStore {
    async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()> {
        self.items.lock().push(item);
        Ok(())
    }

    async fn pending_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|item| item.document_id == document_id && item.status == QueueItemStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_status(&self, item_id: Uuid, status: QueueItemStatus) -> Result<()> {
        if let Some(item) = self.items.lock().iter_mut().find(|item| item.id == item_id) {
            item.status = status;
        }
        Ok(())
    }
}

/// In-memory `CompletionMarkerStore`, keyed the way the real stores are:
/// `(document_id, stage_name)`.
#[derive(Default)]
pub struct InMemoryMarkerStore {
    markers: Mutex<HashMap<(Uuid, String), StageCompletionMarker>>,
}

impl InMemoryMarkerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompletionMarkerStore for InMemoryMarkerStore {
    async fn get_marker(&self, document_id: Uuid, stage_name: &str) -> Result<Option<StageCompletionMarker>> {
        Ok(self.markers.lock().get(&(document_id, stage_name.to_string())).cloned())
    }

    async fn set_marker(&self, marker: StageCompletionMarker) -> Result<()> {
        self.markers.lock().insert((marker.document_id, marker.stage_name.clone()), marker);
        Ok(())
    }

    async fn delete_marker(&self, document_id: Uuid, stage_name: &str) -> Result<()> {
        self.markers.lock().remove(&(document_id, stage_name.to_string()));
        Ok(())
    }
}

/// In-memory `EmbeddingSink`, deduping on `(source_id, source_type)` the way
/// `unified_embeddings`'s unique index does.
#[derive(Default)]
pub struct InMemoryEmbeddingSink {
    rows: Mutex<Vec<UnifiedEmbedding>>,
}

impl InMemoryEmbeddingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EmbeddingSink for InMemoryEmbeddingSink {
    async fn exists(&self, source_id: Uuid, source_type: SourceType) -> Result<bool> {
        Ok(self.rows.lock().iter().any(|row| row.source_id == source_id && row.source_type == source_type))
    }

    async fn insert(&self, embedding: UnifiedEmbedding) -> Result<()> {
        self.rows.lock().push(embedding);
        Ok(())
    }
}

/// `ModelClient` that returns a fixed-width zero vector per text, never
/// calling out to a real embedding server.
pub struct StubModelClient;

#[async_trait]
impl ModelClient for StubModelClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| test_vector(0.0)).collect())
    }
}

/// `VisionModelClient` that returns a fixed-width zero vector per image,
/// never calling out to a real vision model.
pub struct StubVisionModelClient;

#[async_trait]
impl VisionModelClient for StubVisionModelClient {
    async fn embed_image(&self, _bytes: &[u8]) -> Result<Vec<f32>> {
        Ok(test_vector(0.0))
    }
}

/// In-memory `AdvisoryLock`, one held key at a time, mirroring the real
/// redb-backed lock's `try_acquire`/`release` contract.
#[derive(Default)]
pub struct InMemoryAdvisoryLock {
    held: Mutex<std::collections::HashSet<String>>,
}

impl InMemoryAdvisoryLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdvisoryLock for InMemoryAdvisoryLock {
    async fn try_acquire(&self, key: &str) -> Result<bool> {
        Ok(self.held.lock().insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.held.lock().remove(key);
        Ok(())
    }
}

/// In-memory `BackgroundRetryQueue`, recording what was enqueued without
/// ever firing it — fine for assertions, not for exercising the retry path
/// end-to-end (use `krai_core`'s own `InProcessRetryQueue` for that).
#[derive(Default)]
pub struct RecordingRetryQueue {
    pub retries: Arc<Mutex<Vec<ScheduledRetry>>>,
}

impl RecordingRetryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackgroundRetryQueue for RecordingRetryQueue {
    async fn enqueue(&self, retry: ScheduledRetry) -> Result<()> {
        self.retries.lock().push(retry);
        Ok(())
    }

    async fn cancel_document(&self, document_id: Uuid) -> Result<()> {
        self.retries.lock().retain(|retry| retry.document_id != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_object_store_dedups_identical_bytes() {
        let store = InMemoryObjectStore::new();
        let a = store.put("images", "image/png", b"hello").await.unwrap();
        let b = store.put("images", "image/png", b"hello").await.unwrap();
        assert_eq!(a.storage_path, b.storage_path);
        assert!(store.exists("images", &a.content_hash).await.unwrap());
    }

    #[tokio::test]
    async fn in_memory_document_store_rejects_duplicate_hash() {
        let store = InMemoryDocumentStore::new();
        let document = test_document("manual.pdf", 1024);
        store.insert(document.clone()).await.unwrap();
        let mut duplicate = test_document("manual-2.pdf", 2048);
        duplicate.file_hash = document.file_hash.clone();
        assert!(store.insert(duplicate).await.is_err());
        assert_eq!(store.find_by_hash(&document.file_hash).await.unwrap(), Some(document.id));
    }

    #[tokio::test]
    async fn in_memory_queue_store_only_returns_pending_items() {
        let queue = InMemoryQueueStore::new();
        let document_id = Uuid::new_v4();
        let item = ProcessingQueueItem::new(
            document_id,
            krai_core::types::QueuePayload::Link {
                url: "https://example.com".to_string(),
                page_number: 1,
                context_description: None,
                related_error_codes: vec![],
                related_products: vec![],
            },
        );
        let item_id = item.id;
        queue.enqueue(item).await.unwrap();
        assert_eq!(queue.pending_for_document(document_id).await.unwrap().len(), 1);

        queue.mark_status(item_id, QueueItemStatus::Completed).await.unwrap();
        assert!(queue.pending_for_document(document_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_advisory_lock_is_mutually_exclusive() {
        let lock = InMemoryAdvisoryLock::new();
        assert!(lock.try_acquire("doc:stage").await.unwrap());
        assert!(!lock.try_acquire("doc:stage").await.unwrap());
        lock.release("doc:stage").await.unwrap();
        assert!(lock.try_acquire("doc:stage").await.unwrap());
    }
}
