//! Manufacturer / series / product hierarchy, error codes and parts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique by `name`. Shared across documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: Uuid,
    pub name: String,
}

/// Unique by `(manufacturer_id, series_name, model_pattern)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSeries {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    pub series_name: String,
    pub model_pattern: String,
}

/// Unique by `(manufacturer_id, model_number)`. Gets a `series_id` once
/// series detection matches it against a manufacturer pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    pub model_number: String,
    pub series_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Regex,
    Llm,
}

/// An error/fault code extracted during metadata extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCode {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_id: Option<Uuid>,
    pub code: String,
    pub description: String,
    pub solution: Option<String>,
    pub page_number: u32,
    /// `[0, 1]`.
    pub confidence: f32,
    pub severity: Severity,
    pub extraction_method: ExtractionMethod,
    pub requires_technician: bool,
    pub requires_parts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    Consumable,
    Assembly,
    Component,
    Mechanical,
    Electrical,
}

/// Unique by `(part_number, manufacturer_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub part_number: String,
    pub manufacturer_id: Uuid,
    pub name: Option<String>,
    pub description: String,
    pub category: Option<PartCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    SolutionText,
    Chunk,
}

/// Links an [`ErrorCode`] to a [`Part`] believed necessary for the fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCodePartLink {
    pub error_code_id: Uuid,
    pub part_id: Uuid,
    pub relevance_score: f32,
    pub extraction_source: ExtractionSource,
}
