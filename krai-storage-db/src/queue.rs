//! `processing_queue`: backs [`krai_core::storage::ProcessingQueueStore`].

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::storage::ProcessingQueueStore;
use krai_core::types::{ProcessingQueueItem, QueueItemStatus, QueuePayload};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlProcessingQueue {
    store: LibsqlStore,
}

impl LibsqlProcessingQueue {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn status_to_str(status: QueueItemStatus) -> &'static str {
    match status {
        QueueItemStatus::Pending => "pending",
        QueueItemStatus::Completed => "completed",
    }
}

fn status_from_str(s: &str) -> Result<QueueItemStatus> {
    match s {
        "pending" => Ok(QueueItemStatus::Pending),
        "completed" => Ok(QueueItemStatus::Completed),
        other => Err(Error::Storage(format!("unknown processing_queue status: {other}"))),
    }
}

#[async_trait]
impl ProcessingQueueStore for LibsqlProcessingQueue {
    async fn enqueue(&self, item: ProcessingQueueItem) -> Result<()> {
        let conn = self.store.connection()?;
        let payload = serde_json::to_string(&item.payload).map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO processing_queue (id, document_id, stage, status, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                item.id.to_string(),
                item.document_id.to_string(),
                item.stage,
                status_to_str(item.status),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "processing_queue", item.id.to_string()))?;
        Ok(())
    }

    async fn pending_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessingQueueItem>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, stage, status, payload FROM processing_queue
                 WHERE document_id = ? AND status = 'pending'
                 ORDER BY created_at ASC",
                libsql::params![document_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let stage: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let status: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let payload: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;

            items.push(ProcessingQueueItem {
                id: Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?,
                document_id,
                stage: stage_as_static(&stage),
                status: status_from_str(&status)?,
                payload: serde_json::from_str::<QueuePayload>(&payload).map_err(Error::Serialization)?,
            });
        }
        Ok(items)
    }

    async fn mark_status(&self, item_id: Uuid, status: QueueItemStatus) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "UPDATE processing_queue SET status = ? WHERE id = ?",
            libsql::params![status_to_str(status), item_id.to_string()],
        )
        .await
        .map_err(|e| map_libsql_error(e, "processing_queue", item_id.to_string()))?;
        Ok(())
    }
}

/// `ProcessingQueueItem::stage` is `&'static str` (it is always `"storage"`
/// today — see [`ProcessingQueueItem::new`]); read rows only ever round-trip
/// that value.
fn stage_as_static(stage: &str) -> &'static str {
    match stage {
        "storage" => "storage",
        _ => "storage",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krai_core::types::BoundingBox;

    async fn fixture() -> LibsqlProcessingQueue {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlProcessingQueue::new(store)
    }

    fn image_item(document_id: Uuid) -> ProcessingQueueItem {
        ProcessingQueueItem::new(
            document_id,
            QueuePayload::Image {
                filename: "a.png".to_string(),
                page_number: 1,
                bbox: Some(BoundingBox { x0: 0.0, y0: 0.0, x1: 10.0, y1: 10.0 }),
                image_type: krai_core::types::ImageType::Diagram,
                content_base64: Some("YWJj".to_string()),
                temp_path: None,
                svg_storage_url: None,
                context_caption: None,
                related_error_codes: vec![],
                related_products: vec![],
            },
        )
    }

    #[tokio::test]
    async fn enqueued_item_is_pending_until_marked_complete() {
        let queue = fixture().await;
        let document_id = Uuid::new_v4();
        let item = image_item(document_id);
        let item_id = item.id;
        queue.enqueue(item).await.unwrap();

        let pending = queue.pending_for_document(document_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, item_id);

        queue.mark_status(item_id, QueueItemStatus::Completed).await.unwrap();
        assert!(queue.pending_for_document(document_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_items_are_scoped_to_their_document() {
        let queue = fixture().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.enqueue(image_item(a)).await.unwrap();
        queue.enqueue(image_item(b)).await.unwrap();

        assert_eq!(queue.pending_for_document(a).await.unwrap().len(), 1);
        assert_eq!(queue.pending_for_document(b).await.unwrap().len(), 1);
    }
}
