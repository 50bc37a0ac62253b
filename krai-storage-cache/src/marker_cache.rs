//! Read-through cache over a durable [`CompletionMarkerStore`]: `get_marker`
//! checks the redb cache first, only falling back to `inner` on a miss, and
//! `inner` stays the source of truth for every write. Purely a performance
//! aid — if the cache is lost, the next `get_marker` simply repopulates it.

use std::sync::Arc;

use async_trait::async_trait;
use redb::{ReadableTable, TableDefinition};
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::idempotency::CompletionMarkerStore;
use krai_core::types::StageCompletionMarker;

use crate::store::RedbCacheStore;

const MARKERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("completion_markers");

fn cache_key(document_id: Uuid, stage_name: &str) -> String {
    format!("{document_id}:{stage_name}")
}

pub struct CachingCompletionMarkerStore {
    cache: RedbCacheStore,
    inner: Arc<dyn CompletionMarkerStore>,
}

impl CachingCompletionMarkerStore {
    #[must_use]
    pub fn new(cache: RedbCacheStore, inner: Arc<dyn CompletionMarkerStore>) -> Self {
        Self { cache, inner }
    }

    async fn read_cached(&self, key: String) -> Result<Option<StageCompletionMarker>> {
        let db = self.cache.db.clone();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(format!("begin_read: {e}")))?;
            let table = match read_txn.open_table(MARKERS_TABLE) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(Error::Storage(format!("open_table: {e}"))),
            };
            let Some(bytes) = table.get(key.as_str()).map_err(|e| Error::Storage(format!("get: {e}")))? else {
                return Ok(None);
            };
            let marker: StageCompletionMarker =
                serde_json::from_slice(bytes.value()).map_err(Error::Serialization)?;
            Ok::<Option<StageCompletionMarker>, Error>(Some(marker))
        })
        .await
        .map_err(|e| Error::Storage(format!("cache task join error: {e}")))?
    }

    async fn write_cached(&self, key: String, marker: &StageCompletionMarker) -> Result<()> {
        let db = self.cache.db.clone();
        let bytes = serde_json::to_vec(marker).map_err(Error::Serialization)?;
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            {
                let mut table = write_txn.open_table(MARKERS_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                table.insert(key.as_str(), bytes.as_slice()).map_err(|e| Error::Storage(format!("insert: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Storage(format!("cache task join error: {e}")))?
    }

    async fn evict_cached(&self, key: String) -> Result<()> {
        let db = self.cache.db.clone();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            {
                let mut table = write_txn.open_table(MARKERS_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                table.remove(key.as_str()).map_err(|e| Error::Storage(format!("remove: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Storage(format!("cache task join error: {e}")))?
    }
}

#[async_trait]
impl CompletionMarkerStore for CachingCompletionMarkerStore {
    async fn get_marker(&self, document_id: Uuid, stage_name: &str) -> Result<Option<StageCompletionMarker>> {
        let key = cache_key(document_id, stage_name);
        if let Some(marker) = self.read_cached(key.clone()).await? {
            return Ok(Some(marker));
        }
        let marker = self.inner.get_marker(document_id, stage_name).await?;
        if let Some(marker) = &marker {
            self.write_cached(key, marker).await?;
        }
        Ok(marker)
    }

    async fn set_marker(&self, marker: StageCompletionMarker) -> Result<()> {
        let key = cache_key(marker.document_id, &marker.stage_name);
        self.inner.set_marker(marker.clone()).await?;
        self.write_cached(key, &marker).await
    }

    async fn delete_marker(&self, document_id: Uuid, stage_name: &str) -> Result<()> {
        self.inner.delete_marker(document_id, stage_name).await?;
        self.evict_cached(cache_key(document_id, stage_name)).await
    }
}
