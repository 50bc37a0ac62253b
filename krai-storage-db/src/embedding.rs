//! `unified_embeddings`: backs [`krai_core::embedding::stage::EmbeddingSink`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::embedding::EmbeddingSink;
use krai_core::error::{Error, Result};
use krai_core::types::{SourceType, UnifiedEmbedding};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlEmbeddingSink {
    store: LibsqlStore,
}

impl LibsqlEmbeddingSink {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn source_type_to_str(t: SourceType) -> &'static str {
    match t {
        SourceType::Text => "text",
        SourceType::Image => "image",
        SourceType::Table => "table",
        SourceType::Context => "context",
    }
}

#[async_trait]
impl EmbeddingSink for LibsqlEmbeddingSink {
    async fn exists(&self, source_id: Uuid, source_type: SourceType) -> Result<bool> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM unified_embeddings WHERE source_id = ? AND source_type = ?",
                libsql::params![source_id.to_string(), source_type_to_str(source_type)],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(rows.next().await.map_err(|e| Error::Storage(e.to_string()))?.is_some())
    }

    async fn insert(&self, embedding: UnifiedEmbedding) -> Result<()> {
        let conn = self.store.connection()?;
        let vector = serde_json::to_string(&embedding.vector).map_err(Error::Serialization)?;
        conn.execute(
            "INSERT INTO unified_embeddings (id, document_id, source_id, source_type, vector, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                embedding.id.to_string(),
                embedding.document_id.to_string(),
                embedding.source_id.to_string(),
                source_type_to_str(embedding.source_type),
                vector,
                embedding.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "unified_embeddings", format!("{}/{:?}", embedding.source_id, embedding.source_type)))?;
        Ok(())
    }
}
