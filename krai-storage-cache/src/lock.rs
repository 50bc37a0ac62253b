//! Advisory lock backed by a redb table: one row per held `(document_id,
//! stage)` key, keyed by the string [`krai_core::retry::lock_key`] already
//! produces.

use async_trait::async_trait;
use redb::{ReadableTable, TableDefinition};

use krai_core::error::{Error, Result};
use krai_core::retry::AdvisoryLock;

use crate::store::RedbCacheStore;

const LOCKS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("advisory_locks");

pub struct RedbAdvisoryLock {
    store: RedbCacheStore,
}

impl RedbAdvisoryLock {
    #[must_use]
    pub fn new(store: RedbCacheStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AdvisoryLock for RedbAdvisoryLock {
    async fn try_acquire(&self, key: &str) -> Result<bool> {
        let db = self.store.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            let acquired = {
                let mut table = write_txn.open_table(LOCKS_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                if table.get(key.as_str()).map_err(|e| Error::Storage(format!("get: {e}")))?.is_some() {
                    false
                } else {
                    let now = chrono::Utc::now().timestamp() as u64;
                    table.insert(key.as_str(), now).map_err(|e| Error::Storage(format!("insert: {e}")))?;
                    true
                }
            };
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<bool, Error>(acquired)
        })
        .await
        .map_err(|e| Error::Storage(format!("lock task join error: {e}")))?
    }

    async fn release(&self, key: &str) -> Result<()> {
        let db = self.store.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let write_txn = db.begin_write().map_err(|e| Error::Storage(format!("begin_write: {e}")))?;
            {
                let mut table = write_txn.open_table(LOCKS_TABLE).map_err(|e| Error::Storage(format!("open_table: {e}")))?;
                table.remove(key.as_str()).map_err(|e| Error::Storage(format!("remove: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Storage(format!("commit: {e}")))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Storage(format!("lock task join error: {e}")))?
    }
}
