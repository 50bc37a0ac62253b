//! `documents`: backs [`krai_core::storage::DocumentStore`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::storage::DocumentStore;
use krai_core::types::{Document, DocumentStatus, DocumentType};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlDocumentStore {
    store: LibsqlStore,
}

impl LibsqlDocumentStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn document_type_to_str(t: DocumentType) -> &'static str {
    match t {
        DocumentType::ServiceManual => "service_manual",
        DocumentType::PartsCatalog => "parts_catalog",
        DocumentType::Bulletin => "bulletin",
        DocumentType::Unknown => "unknown",
    }
}

fn status_to_str(s: DocumentStatus) -> &'static str {
    match s {
        DocumentStatus::Uploaded => "uploaded",
        DocumentStatus::Processing => "processing",
        DocumentStatus::Completed => "completed",
        DocumentStatus::Failed => "failed",
    }
}

#[async_trait]
impl DocumentStore for LibsqlDocumentStore {
    async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Uuid>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query("SELECT id FROM documents WHERE file_hash = ?", libsql::params![file_hash.to_string()])
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Some(Uuid::parse_str(&id).map_err(|e| Error::Storage(e.to_string()))?))
    }

    async fn insert(&self, document: Document) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO documents (id, file_hash, filename, size, page_count, manufacturer, model,
                document_type, language, version, status, search_ready, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                document.id.to_string(),
                document.file_hash.clone(),
                document.filename,
                document.size,
                document.page_count,
                document.manufacturer,
                document.model,
                document_type_to_str(document.document_type),
                document.language,
                document.version,
                status_to_str(document.status),
                document.search_ready,
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "documents", document.file_hash))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> LibsqlDocumentStore {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlDocumentStore::new(store)
    }

    #[tokio::test]
    async fn insert_then_find_by_hash_round_trips() {
        let store = fixture().await;
        let document = Document::new("hash1".to_string(), "manual.pdf".to_string(), 1024);
        let id = document.id;
        store.insert(document).await.unwrap();

        assert_eq!(store.find_by_hash("hash1").await.unwrap(), Some(id));
        assert_eq!(store.find_by_hash("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_file_hash_is_a_unique_violation() {
        let store = fixture().await;
        let first = Document::new("dup".to_string(), "a.pdf".to_string(), 10);
        let second = Document::new("dup".to_string(), "b.pdf".to_string(), 20);
        store.insert(first).await.unwrap();

        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { table: "documents", .. }));
    }
}
