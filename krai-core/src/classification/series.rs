//! Series Detection (stage 12): matches each classified model number
//! against the manufacturer's series rules and links the product to its
//! series, upserting both. Runs after `metadata_extraction` purely for
//! pipeline ordering — series detection has no direct dependency on
//! extracted error codes, but `metadata_extraction` populating
//! `context.error_codes` is itself gated on `chunk_preprocessing`, and
//! series naming is most useful once a document's fault data is in place.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::classification::{CatalogStore, DEGRADED_MANUFACTURER};
use crate::error::{Error, Result};
use crate::patterns;
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, Stage};

pub struct SeriesDetectionProcessor {
    catalog: Arc<dyn CatalogStore>,
}

impl SeriesDetectionProcessor {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Insert the series, falling back to a lookup when another run already
    /// created the same `(manufacturer_id, series_name, model_pattern)` row.
    async fn upsert_series(&self, manufacturer_id: uuid::Uuid, series_name: &str, model_pattern: &str) -> Result<uuid::Uuid> {
        match self.catalog.insert_series(manufacturer_id, series_name, model_pattern).await {
            Ok(id) => Ok(id),
            Err(Error::UniqueViolation { .. }) => self
                .catalog
                .find_series(manufacturer_id, series_name, model_pattern)
                .await?
                .ok_or_else(|| Error::ContractViolation("series upsert conflicted but lookup found nothing".to_string())),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Processor for SeriesDetectionProcessor {
    fn name(&self) -> &'static str {
        "series_detection"
    }

    fn stage(&self) -> Stage {
        Stage::SeriesDetection
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["products", "product_series"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let manufacturer = context.manufacturer.clone().unwrap_or_else(|| DEGRADED_MANUFACTURER.to_string());
        let mut data = HashMap::new();

        if manufacturer == DEGRADED_MANUFACTURER || context.models.is_empty() {
            tracing::info!("manufacturer unresolved or no models classified, skipping series detection");
            data.insert("series_matched".to_string(), serde_json::json!(0));
            return Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0));
        }

        let manufacturer_id = self.catalog.upsert_manufacturer(&manufacturer).await?;
        let mut matched = 0u64;

        for model in &context.models {
            let product_id = self.catalog.upsert_product(manufacturer_id, model).await?;
            let Some((series_name, model_pattern)) = patterns::detect_series(&manufacturer, model) else {
                continue;
            };
            let series_id = self.upsert_series(manufacturer_id, &series_name, &model_pattern).await?;
            self.catalog.link_product_to_series(product_id, series_id).await?;
            matched += 1;
        }

        data.insert("series_matched".to_string(), serde_json::json!(matched));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}
