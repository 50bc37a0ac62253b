//! Images, links and videos — the non-text artifacts a document yields.

use super::chunk::BoundingBox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Photo,
    Diagram,
    Screenshot,
    VectorGraphic,
}

/// A raster or vectorized image, deduplicated within a document by
/// `(document_id, file_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
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

/// A URL referenced by the document text, dedup'd by `(document_id, url)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub page_number: u32,
    pub context_description: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub needs_enrichment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_missing: Option<bool>,
}

/// An external video link. Dedup'd by `(platform, youtube_id)` when the
/// platform exposes a stable video id, otherwise by `(document_id, video_url)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub page_number: u32,
    pub context_description: Option<String>,
    pub related_error_codes: Vec<String>,
    pub related_products: Vec<String>,
    pub platform: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<u32>,
    pub enrichment_error: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub metadata: VideoMetadata,
}

impl Video {
    /// The key the Storage stage dedups on: a stable per-platform video id
    /// when the URL yields one (e.g. a YouTube `v=` parameter), falling back
    /// to `(document_id, url)`.
    #[must_use]
    pub fn dedup_key(&self, youtube_id: Option<&str>) -> String {
        match youtube_id {
            Some(id) => format!("{}::{}", self.platform, id),
            None => format!("{}::{}", self.document_id, self.url),
        }
    }
}
