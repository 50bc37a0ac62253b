//! Text chunks produced by the Smart Chunker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    ErrorCodeSection,
}

/// Free-form, additive metadata. `section_hierarchy`/`section_level` are set
/// when hierarchical chunking is on; `error_code` when error-code-aware
/// sectioning tags a chunk; `previous_chunk_id`/`next_chunk_id` when chunk
/// linking is on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_hierarchy: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_chunk_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_chunk_id: Option<Uuid>,
}

/// One ordered slice of document text. `fingerprint` is the basis for
/// content-level dedup at persist time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: u32,
    pub text: String,
    pub fingerprint: String,
    pub page_start: u32,
    pub page_end: u32,
    pub chunk_type: ChunkType,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    #[must_use]
    pub fn new(document_id: Uuid, chunk_index: u32, text: String, page_start: u32, page_end: u32) -> Self {
        let fingerprint = crate::idempotency::sha256_hex(Self::normalize(&text).as_bytes());
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            text,
            fingerprint,
            page_start,
            page_end,
            chunk_type: ChunkType::Text,
            metadata: ChunkMetadata::default(),
        }
    }

    /// Normalization applied before fingerprinting: collapse internal
    /// whitespace runs and trim, so reflowed-but-identical text still dedups.
    #[must_use]
    pub fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// A table extracted by the Table stage, with both a cell matrix and a
/// markdown rendering so it can be embedded as text (`source_type = table`)
/// and displayed as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredTable {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: u32,
    pub markdown: String,
    pub rows: Vec<Vec<String>>,
    pub cols: u32,
    pub bbox: Option<BoundingBox>,
    pub context_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_whitespace_reflow() {
        let document_id = Uuid::new_v4();
        let a = Chunk::new(document_id, 0, "hello   world".to_string(), 0, 0);
        let b = Chunk::new(document_id, 0, "hello\nworld".to_string(), 0, 0);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
