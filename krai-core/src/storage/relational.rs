//! The relational seam the Storage stage upserts through. A real
//! implementation backed by libsql lives in `krai-storage-db`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{BoundingBox, ImageType, VideoMetadata};

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub document_id: Uuid,
    pub storage_url: String,
    pub filename: String,
    pub page_number: u32,
    pub bbox: Option<BoundingBox>,
    pub image_type: ImageType,
    pub file_hash: String,
    pub context_caption: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
    pub svg_storage_url: Option<String>,
    pub has_png_derivative: bool,
}

#[derive(Debug, Clone)]
pub struct LinkRow {
    pub document_id: Uuid,
    pub url: String,
    pub page_number: u32,
    pub context_description: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VideoRow {
    pub document_id: Uuid,
    pub url: String,
    pub page_number: u32,
    pub context_description: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
    pub platform: String,
    pub youtube_id: Option<String>,
    pub metadata: VideoMetadata,
}

/// Whether an upsert created a new row or found an existing one under the
/// same dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Each method dedups per its own uniqueness rule and is safe to call twice
/// with the same logical key — that's what makes the Storage stage
/// resumable.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Dedup key: `(document_id, file_hash)`.
    async fn upsert_image(&self, row: ImageRow) -> Result<(Uuid, UpsertOutcome)>;
    /// Dedup key: `(document_id, url)`.
    async fn upsert_link(&self, row: LinkRow) -> Result<(Uuid, UpsertOutcome)>;
    /// Dedup key: `(platform, youtube_id)` when `youtube_id` is set, else
    /// `(document_id, url)`.
    async fn upsert_video(&self, row: VideoRow) -> Result<(Uuid, UpsertOutcome)>;
}
