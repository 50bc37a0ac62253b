//! The root entity every other row hangs off of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ServiceManual,
    PartsCatalog,
    Bulletin,
    /// Recorded per REDESIGN FLAGS when classification output is unparsable,
    /// rather than defaulting to `ServiceManual` with a fabricated confidence.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

/// A single ingested PDF and everything the engine has learned about it.
///
/// Invariant: `file_hash` is unique — a second upload of identical content
/// must resolve to the existing `id` rather than creating a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_hash: String,
    pub filename: String,
    pub size: u64,
    pub page_count: Option<u32>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub document_type: DocumentType,
    pub language: Option<String>,
    pub version: Option<String>,
    pub status: DocumentStatus,
    pub search_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(file_hash: String, filename: String, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_hash,
            filename,
            size,
            page_count: None,
            manufacturer: None,
            model: None,
            document_type: DocumentType::Unknown,
            language: None,
            version: None,
            status: DocumentStatus::Uploaded,
            search_ready: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable record that a stage produced its outputs for a given input
/// fingerprint. Unique by `(document_id, stage_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCompletionMarker {
    pub document_id: Uuid,
    pub stage_name: String,
    pub completed_at: DateTime<Utc>,
    pub data_hash: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Materializes the pipeline state machine. Unique by `(document_id, stage_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub document_id: Uuid,
    pub stage_name: String,
    pub status: StageState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub progress: Option<f32>,
}

impl StageStatus {
    #[must_use]
    pub fn pending(document_id: Uuid, stage_name: &str) -> Self {
        Self {
            document_id,
            stage_name: stage_name.to_string(),
            status: StageState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            progress: None,
        }
    }
}
