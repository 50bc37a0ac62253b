//! `stage_completion_markers`: backs [`krai_core::idempotency::CompletionMarkerStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::idempotency::CompletionMarkerStore;
use krai_core::types::StageCompletionMarker;

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlCompletionMarkerStore {
    store: LibsqlStore,
}

impl LibsqlCompletionMarkerStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CompletionMarkerStore for LibsqlCompletionMarkerStore {
    async fn get_marker(&self, document_id: Uuid, stage_name: &str) -> Result<Option<StageCompletionMarker>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT completed_at, data_hash, metadata FROM stage_completion_markers WHERE document_id = ? AND stage_name = ?",
                libsql::params![document_id.to_string(), stage_name.to_string()],
            )
            .await
            .map_err(|e| map_libsql_error(e, "stage_completion_markers", document_id.to_string()))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| map_libsql_error(e, "stage_completion_markers", document_id.to_string()))?
        else {
            return Ok(None);
        };

        let completed_at: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let data_hash: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        let metadata: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Some(StageCompletionMarker {
            document_id,
            stage_name: stage_name.to_string(),
            completed_at: completed_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| Error::Storage(format!("bad completed_at timestamp: {e}")))?,
            data_hash,
            metadata: serde_json::from_str(&metadata).map_err(Error::Serialization)?,
        }))
    }

    async fn set_marker(&self, marker: StageCompletionMarker) -> Result<()> {
        let conn = self.store.connection()?;
        let metadata = serde_json::to_string(&marker.metadata).map_err(Error::Serialization)?;
        conn.execute(
            "INSERT INTO stage_completion_markers (document_id, stage_name, completed_at, data_hash, metadata)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (document_id, stage_name) DO UPDATE SET
                completed_at = excluded.completed_at,
                data_hash = excluded.data_hash,
                metadata = excluded.metadata",
            libsql::params![
                marker.document_id.to_string(),
                marker.stage_name.clone(),
                marker.completed_at.to_rfc3339(),
                marker.data_hash,
                metadata,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "stage_completion_markers", marker.document_id.to_string()))?;
        Ok(())
    }

    async fn delete_marker(&self, document_id: Uuid, stage_name: &str) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "DELETE FROM stage_completion_markers WHERE document_id = ? AND stage_name = ?",
            libsql::params![document_id.to_string(), stage_name.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "stage_completion_markers", document_id.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibsqlStore;

    async fn fixture() -> LibsqlCompletionMarkerStore {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlCompletionMarkerStore::new(store)
    }

    #[tokio::test]
    async fn unset_marker_reads_back_as_none() {
        let markers = fixture().await;
        assert!(markers.get_marker(Uuid::new_v4(), "embedding").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let markers = fixture().await;
        let document_id = Uuid::new_v4();
        let marker = StageCompletionMarker {
            document_id,
            stage_name: "embedding".to_string(),
            completed_at: Utc::now(),
            data_hash: "abc123".to_string(),
            metadata: serde_json::json!({"retry_attempt": 0}),
        };
        markers.set_marker(marker.clone()).await.unwrap();
        let read_back = markers.get_marker(document_id, "embedding").await.unwrap().unwrap();
        assert_eq!(read_back.data_hash, "abc123");
    }

    #[tokio::test]
    async fn setting_twice_overwrites_the_data_hash() {
        let markers = fixture().await;
        let document_id = Uuid::new_v4();
        let first = StageCompletionMarker {
            document_id,
            stage_name: "embedding".to_string(),
            completed_at: Utc::now(),
            data_hash: "first".to_string(),
            metadata: serde_json::json!({}),
        };
        let second = StageCompletionMarker { data_hash: "second".to_string(), ..first.clone() };
        markers.set_marker(first).await.unwrap();
        markers.set_marker(second).await.unwrap();
        let read_back = markers.get_marker(document_id, "embedding").await.unwrap().unwrap();
        assert_eq!(read_back.data_hash, "second");
    }

    #[tokio::test]
    async fn delete_marker_clears_it() {
        let markers = fixture().await;
        let document_id = Uuid::new_v4();
        markers
            .set_marker(StageCompletionMarker {
                document_id,
                stage_name: "embedding".to_string(),
                completed_at: Utc::now(),
                data_hash: "abc".to_string(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        markers.delete_marker(document_id, "embedding").await.unwrap();
        assert!(markers.get_marker(document_id, "embedding").await.unwrap().is_none());
    }
}
