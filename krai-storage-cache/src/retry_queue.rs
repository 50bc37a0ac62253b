//! Background retry durability, backed by a redb table keyed by
//! `correlation_id` so a crashed process can replay pending retries on the
//! next start via [`RedbBackgroundRetryQueue::resume_pending`]. Firing the
//! retry itself (calling back into `safe_process`) is the caller's job —
//! this crate only guarantees the scheduled retry isn't lost.

use async_trait::async_trait;
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::retry::{BackgroundRetryQueue, ScheduledRetry};
use krai_core::types::Stage;

use crate::store::RedbCacheStore;

const RETRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("background_retries");

/// [`ScheduledRetry`] has no `Serialize` impl of its own (it is a pure
/// in-process message type); this is the durable encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedRetry {
    document_id: Uuid,
    stage: Stage,
    attempt: u32,
    correlation_id: String,
    delay_ms: u64,
}

impl From<&ScheduledRetry> for PersistedRetry {
    fn from(retry: &ScheduledRetry) -> Self {
        Self {
            document_id: retry.document_id,
            stage: retry.stage,
            attempt: retry.attempt,
            correlation_id: retry.correlation_id.clone(),
            delay_ms: retry.delay.as_millis() as u64,
        }
    }
}

impl From<PersistedRetry> for ScheduledRetry {
    fn from(p: PersistedRetry) -> Self {
        Self {
            document_id: p.document_id,
            stage: p.stage,
            attempt: p.attempt,
            correlation_id: p.correlation_id,
            delay: std::time::Duration::from_millis(p.delay_ms),
        }
    }
}

pub struct RedbBackgroundRetryQueue {
    store: RedbCacheStore,
}

impl RedbBackgroundRetryQueue {
    #[must_use]
    pub fn new(store: RedbCacheStore) -> Self {
        Self { store }
    }

    /// Every retry still on record, e.g. for replay after a restart. Does
    /// not clear the table — callers clear entries themselves once a retry
    /// has actually fired, via [`BackgroundRetryQueue::cancel_document`] or
    /// a future `remove_one` if per-entry removal is ever needed.
    pub async fn resume_pending(&self) -> Result<Vec<ScheduledRetry>> {
        let db = self.store.db.clone();
        tokio::task::spawn_blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Storage(format!("begin_read: {e}")))?;
            let table = match read_txn.open_table(RETRIES_TABLE) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(Error::Storage(format!("open_table: {e}"))),
            };
            let mut out = Vec::new();
            for entry in table.iter().map_err(|e| Error::Storage(format!("iter: {e}")))? {
                let (_, value) = entry.map_err(|e| Error::Storage(format!("iter entry: {e}")))?;
                let persisted: PersistedRetry =
                    postcard::from_bytes(value.value()).map_err(|e| Error::Storage(format!("decode retry: {e}")))?;
                out.push(persisted.into());
            }
            Ok::<Vec<ScheduledRetry>, Error>(out)
        })
        .await
        .map_err(|e| Error::Storage(format!("retry task join error: {e}")))?
    }
}

#[async_trait]
impl BackgroundRetryQueue for RedbBackgroundRetryQueue {
    async fn enqueue(&self, retry: ScheduledRetry) -> Result<()> {
        let db = self.store.db.clone();
        let persisted = PersistedRetry::from(&retry);
        let key = persisted.correlation_id.clone();
        let bytes = postcard::to_allocvec(&persisted).map_err(|e| Error::Storage(format!("encode retry: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            {
                let mut table = write_txn.open_table(RETRIES_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                table.insert(key.as_str(), bytes.as_slice()).map_err(|e| Error::Storage(format!("insert: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Storage(format!("retry task join error: {e}")))?
    }

    async fn cancel_document(&self, document_id: Uuid) -> Result<()> {
        let db = self.store.db.clone();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            {
                let mut table = write_txn.open_table(RETRIES_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                let stale: Vec<String> = table
                    .iter()
                    .map_err(|e| Error::Storage(format!("iter: {e}")))?
                    .filter_map(|entry| {
                        let (key, value) = entry.ok()?;
                        let persisted: PersistedRetry = postcard::from_bytes(value.value()).ok()?;
                        (persisted.document_id == document_id).then(|| key.value().to_string())
                    })
                    .collect();
                for key in stale {
                    table.remove(key.as_str()).map_err(|e| Error::Storage(format!("remove: {e}")))?;
                }
            }
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Storage(format!("retry task join error: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn retry(document_id: Uuid, correlation_id: &str) -> ScheduledRetry {
        ScheduledRetry {
            document_id,
            stage: Stage::Embedding,
            attempt: 1,
            correlation_id: correlation_id.to_string(),
            delay: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn enqueued_retries_survive_to_resume_pending() {
        let (store, _dir) = RedbCacheStore::temp();
        let queue = RedbBackgroundRetryQueue::new(store);
        let document_id = Uuid::new_v4();
        queue.enqueue(retry(document_id, "corr-1")).await.unwrap();

        let pending = queue.resume_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].correlation_id, "corr-1");
    }

    #[tokio::test]
    async fn cancel_document_drops_only_its_own_retries() {
        let (store, _dir) = RedbCacheStore::temp();
        let queue = RedbBackgroundRetryQueue::new(store);
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        queue.enqueue(retry(doc_a, "a-1")).await.unwrap();
        queue.enqueue(retry(doc_b, "b-1")).await.unwrap();

        queue.cancel_document(doc_a).await.unwrap();

        let pending = queue.resume_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].correlation_id, "b-1");
    }
}
