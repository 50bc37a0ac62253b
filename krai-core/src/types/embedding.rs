//! The substrate for multimodal search: one table, four source kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimensionality of every vector the model server returns.
pub const EMBEDDING_DIM: usize = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Image,
    Table,
    Context,
}

/// One embedded vector. Keyed by `(source_id, source_type)` — unique, so
/// re-embedding the same source is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEmbedding {
    pub id: Uuid,
    pub document_id: Uuid,
    pub source_id: Uuid,
    pub source_type: SourceType,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl UnifiedEmbedding {
    /// Construct a new embedding row, asserting the vector has the expected
    /// 768-float shape.
    #[must_use]
    pub fn new(document_id: Uuid, source_id: Uuid, source_type: SourceType, vector: Vec<f32>) -> Self {
        debug_assert_eq!(vector.len(), EMBEDDING_DIM, "embedding vector must be 768-wide");
        Self {
            id: Uuid::new_v4(),
            document_id,
            source_id,
            source_type,
            vector,
            created_at: Utc::now(),
        }
    }
}
