//! Producer/consumer queue between the extraction stages and Storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::BoundingBox;
use super::media::{ImageType, VideoMetadata};

/// The tagged payload a [`ProcessingQueueItem`] carries — a sum type
/// replacing the dynamically-typed dict payload of the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuePayload {
    Image {
        filename: String,
        page_number: u32,
        bbox: Option<BoundingBox>,
        image_type: ImageType,
        /// Present when the bytes are small enough to travel inline
        /// (`SVG_INLINE_STORAGE_THRESHOLD_KB`) or were rasterized in-process.
        content_base64: Option<String>,
        temp_path: Option<String>,
        svg_storage_url: Option<String>,
        context_caption: Option<String>,
        related_error_codes: Vec<String>,
        related_products: Vec<String>,
    },
    Link {
        url: String,
        page_number: u32,
        context_description: Option<String>,
        related_error_codes: Vec<String>,
        related_products: Vec<String>,
    },
    Video {
        url: String,
        page_number: u32,
        context_description: Option<String>,
        related_error_codes: Vec<String>,
        related_products: Vec<String>,
        platform: String,
        metadata: VideoMetadata,
    },
    Svg {
        filename: String,
        page_number: u32,
        bbox: Option<BoundingBox>,
        extraction_method: &'static str,
        svg_bytes_base64: String,
        png_bytes_base64: Option<String>,
        context_caption: Option<String>,
        related_error_codes: Vec<String>,
        related_products: Vec<String>,
    },
}

impl QueuePayload {
    #[must_use]
    pub fn artifact_type(&self) -> &'static str {
        match self {
            QueuePayload::Image { .. } => "image",
            QueuePayload::Link { .. } => "link",
            QueuePayload::Video { .. } => "video",
            QueuePayload::Svg { .. } => "svg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Completed,
}

/// One item waiting for the Storage stage to materialize it into the object
/// store and relational rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingQueueItem {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stage: &'static str,
    pub status: QueueItemStatus,
    pub payload: QueuePayload,
}

impl ProcessingQueueItem {
    #[must_use]
    pub fn new(document_id: Uuid, payload: QueuePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            stage: "storage",
            status: QueueItemStatus::Pending,
            payload,
        }
    }
}
