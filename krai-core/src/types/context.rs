//! The per-invocation carrier threaded through a single pipeline run.

use super::document::DocumentType;
use super::stage::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Mutable per-invocation state. Stages read from and write to this carrier
/// to pass computed state forward within a single run; nothing here is
/// durable on its own — durability is the completion marker and the
/// relational store's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingContext {
    pub document_id: Uuid,
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
    pub document_type: Option<DocumentType>,
    pub file_size: Option<u64>,
    /// Populated by `classification`; `None` manufacturer/model is
    /// distinct from the degraded `"AUTO"` manufacturer string, which
    /// downstream stages treat as "no catalogue match to key off of".
    pub manufacturer: Option<String>,
    pub models: Vec<String>,
    pub processing_config: HashMap<String, Value>,

    /// Populated by `text_extraction`, keyed by 0-based page number.
    pub page_texts: Option<HashMap<u32, String>>,
    /// Populated by `chunk_preprocessing`.
    pub chunks: Option<Vec<super::chunk::Chunk>>,
    /// Populated by `image_processing`/`svg_processing`.
    pub images: Option<Vec<super::media::Image>>,
    /// Populated by `table_extraction`.
    pub tables: Option<Vec<super::chunk::StructuredTable>>,
    /// Populated by `metadata_extraction`, independent of whether an error
    /// code sink is wired, so `parts_extraction` and `series_detection` can
    /// read codes back within the same run without a round trip through
    /// storage.
    pub error_codes: Option<Vec<super::catalog::ErrorCode>>,

    pub request_id: String,
    pub correlation_id: String,
    pub retry_attempt: u32,
    pub error_id: Option<Uuid>,
}

impl ProcessingContext {
    /// Start a fresh context for `document_id` at attempt 0, generating a
    /// new 8-hex `request_id`.
    #[must_use]
    pub fn new(document_id: Uuid, stage: Stage) -> Self {
        let request_id = crate::retry::new_request_id();
        let correlation_id = crate::retry::correlation_id(&request_id, stage, 0);
        Self {
            document_id,
            file_path: None,
            file_hash: None,
            document_type: None,
            file_size: None,
            manufacturer: None,
            models: Vec::new(),
            processing_config: HashMap::new(),
            page_texts: None,
            chunks: None,
            images: None,
            tables: None,
            error_codes: None,
            request_id,
            correlation_id,
            retry_attempt: 0,
            error_id: None,
        }
    }

    /// Clone this context for the next retry attempt, carrying the same
    /// `request_id` but a fresh `correlation_id`.
    #[must_use]
    pub fn for_retry_attempt(&self, stage: Stage, attempt: u32) -> Self {
        let mut ctx = self.clone();
        ctx.retry_attempt = attempt;
        ctx.correlation_id = crate::retry::correlation_id(&self.request_id, stage, attempt);
        ctx
    }

    pub fn config_flag(&self, key: &str, default: bool) -> bool {
        self.processing_config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

/// The terminal status of a single `safe_process` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Completed,
    Failed,
    InProgress,
}

/// What every stage invocation, successful or not, returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub processor: String,
    pub status: ProcessingStatus,
    pub data: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
    pub error: Option<String>,
    pub processing_time_s: f64,
    pub correlation_id: String,
}

impl ProcessingResult {
    #[must_use]
    pub fn success(
        processor: impl Into<String>,
        correlation_id: impl Into<String>,
        data: HashMap<String, Value>,
        processing_time_s: f64,
    ) -> Self {
        Self {
            success: true,
            processor: processor.into(),
            status: ProcessingStatus::Completed,
            data,
            metadata: HashMap::new(),
            error: None,
            processing_time_s,
            correlation_id: correlation_id.into(),
        }
    }

    #[must_use]
    pub fn skipped_already_processed(
        processor: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let mut data = HashMap::new();
        data.insert(
            "skipped".to_string(),
            Value::String("already_processed".to_string()),
        );
        Self {
            success: true,
            processor: processor.into(),
            status: ProcessingStatus::Completed,
            data,
            metadata: HashMap::new(),
            error: None,
            processing_time_s: 0.0,
            correlation_id: correlation_id.into(),
        }
    }

    #[must_use]
    pub fn retrying(
        processor: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            processor: processor.into(),
            status: ProcessingStatus::InProgress,
            data: HashMap::new(),
            metadata: HashMap::new(),
            error: None,
            processing_time_s: 0.0,
            correlation_id: correlation_id.into(),
        }
    }

    #[must_use]
    pub fn failed(
        processor: impl Into<String>,
        correlation_id: impl Into<String>,
        error: impl Into<String>,
        processing_time_s: f64,
    ) -> Self {
        Self {
            success: false,
            processor: processor.into(),
            status: ProcessingStatus::Failed,
            data: HashMap::new(),
            metadata: HashMap::new(),
            error: Some(error.into()),
            processing_time_s,
            correlation_id: correlation_id.into(),
        }
    }
}
