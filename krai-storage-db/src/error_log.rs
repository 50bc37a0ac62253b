//! `error_log`: backs [`krai_core::processor::ErrorLogStore`].

use async_trait::async_trait;
use chrono::Utc;

use krai_core::error::Result;
use krai_core::processor::{ErrorLogEntry, ErrorLogStore};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlErrorLogStore {
    store: LibsqlStore,
}

impl LibsqlErrorLogStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ErrorLogStore for LibsqlErrorLogStore {
    async fn record(&self, entry: ErrorLogEntry) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO error_log (error_id, correlation_id, stage, document_id, classification, retry_attempt, message, logged_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                entry.error_id.to_string(),
                entry.correlation_id,
                entry.stage.name().to_string(),
                entry.document_id.to_string(),
                entry.classification.to_string(),
                entry.retry_attempt,
                entry.message,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "error_log", entry.error_id.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krai_core::error::Classification;
    use krai_core::types::Stage;
    use uuid::Uuid;

    #[tokio::test]
    async fn records_a_row_per_failure() {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        let log = LibsqlErrorLogStore::new(store.clone());

        log.record(ErrorLogEntry {
            error_id: Uuid::new_v4(),
            correlation_id: "deadbeef.stage_embedding.retry_0".to_string(),
            stage: Stage::Embedding,
            document_id: Uuid::new_v4(),
            classification: Classification::Transient,
            retry_attempt: 0,
            message: "model server busy".to_string(),
        })
        .await
        .unwrap();

        let conn = store.connection().unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM error_log", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 1);
    }
}
