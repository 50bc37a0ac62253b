//! The relational seam shared by classification, metadata extraction, parts
//! extraction and series detection: manufacturers, products, series and
//! parts are globally shared tables, upserted with unique-constraint-driven
//! idempotency.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ExtractionSource, Part, PartCategory};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Unique by `name`.
    async fn upsert_manufacturer(&self, name: &str) -> Result<Uuid>;

    /// Unique by `(manufacturer_id, model_number)`.
    async fn upsert_product(&self, manufacturer_id: Uuid, model_number: &str) -> Result<Uuid>;

    /// Insert a series. Unique by `(manufacturer_id, series_name,
    /// model_pattern)` — callers catch [`crate::error::Error::UniqueViolation`]
    /// and fall back to [`Self::find_series`].
    async fn insert_series(&self, manufacturer_id: Uuid, series_name: &str, model_pattern: &str) -> Result<Uuid>;

    async fn find_series(&self, manufacturer_id: Uuid, series_name: &str, model_pattern: &str) -> Result<Option<Uuid>>;

    async fn link_product_to_series(&self, product_id: Uuid, series_id: Uuid) -> Result<()>;

    async fn find_part(&self, manufacturer_id: Uuid, part_number: &str) -> Result<Option<Part>>;

    async fn insert_part(
        &self,
        manufacturer_id: Uuid,
        part_number: &str,
        name: Option<&str>,
        description: &str,
        category: Option<PartCategory>,
    ) -> Result<Uuid>;

    async fn update_part_description(&self, part_id: Uuid, description: &str) -> Result<()>;

    /// Best-effort: callers log and ignore a
    /// [`crate::error::Error::UniqueViolation`] here rather than failing the
    /// stage — a part can already be linked to an error code.
    async fn link_error_code_to_part(
        &self,
        error_code_id: Uuid,
        part_id: Uuid,
        relevance_score: f32,
        source: ExtractionSource,
    ) -> Result<()>;
}
