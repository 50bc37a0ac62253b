//! Classification: document type, manufacturer, series, and model numbers
//! from a sample of the document's early pages, via a small LLM call. When
//! the model is unavailable the stage degrades to a fixed `AUTO`
//! manufacturer rather than failing — later stages treat `AUTO` as "no
//! catalogue match", not as a processing error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::processor::Processor;
use crate::types::{DocumentType, ProcessingContext, ProcessingResult, Stage};

/// Sentinel manufacturer used when classification can't determine one.
pub const DEGRADED_MANUFACTURER: &str = "AUTO";

/// How many leading pages are sampled for the classification call.
pub const CLASSIFICATION_SAMPLE_PAGES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub document_type: DocumentType,
    pub manufacturer: String,
    pub series: Option<String>,
    pub models: Vec<String>,
    pub options: Vec<String>,
    pub version: Option<String>,
    pub confidence: f32,
    pub language: Option<String>,
}

impl ClassificationOutput {
    #[must_use]
    pub fn degraded() -> Self {
        Self {
            document_type: DocumentType::Unknown,
            manufacturer: DEGRADED_MANUFACTURER.to_string(),
            series: None,
            models: Vec::new(),
            options: Vec::new(),
            version: None,
            confidence: 0.0,
            language: None,
        }
    }
}

/// The LLM call seam for classification. An `Err` is treated as "model
/// unavailable" and triggers [`ClassificationOutput::degraded`] rather than
/// failing the stage.
#[async_trait]
pub trait ClassificationLlm: Send + Sync {
    async fn classify(&self, sample_text: &str) -> Result<ClassificationOutput>;
}

/// Reconciles the LLM's manufacturer/model guess against an external product
/// catalogue and surfaces any additional models it turns up for that
/// manufacturer.
#[async_trait]
pub trait ProductDiscovery: Send + Sync {
    async fn discover(&self, manufacturer: &str, models: &[String]) -> Result<Vec<String>>;
}

/// Used when no web-verification collaborator is wired: the LLM's own
/// model list stands as-is.
pub struct NoopProductDiscovery;

#[async_trait]
impl ProductDiscovery for NoopProductDiscovery {
    async fn discover(&self, _manufacturer: &str, _models: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct ClassificationProcessor {
    llm: Arc<dyn ClassificationLlm>,
    discovery: Arc<dyn ProductDiscovery>,
}

impl ClassificationProcessor {
    #[must_use]
    pub fn new(llm: Arc<dyn ClassificationLlm>, discovery: Arc<dyn ProductDiscovery>) -> Self {
        Self { llm, discovery }
    }

    fn sample_text(context: &ProcessingContext) -> String {
        let Some(page_texts) = &context.page_texts else {
            return String::new();
        };
        let mut pages: Vec<_> = page_texts.iter().collect();
        pages.sort_by_key(|(page, _)| **page);
        pages
            .into_iter()
            .take(CLASSIFICATION_SAMPLE_PAGES)
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Processor for ClassificationProcessor {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn stage(&self) -> Stage {
        Stage::Classification
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["page_texts"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["documents"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let sample = Self::sample_text(context);
        let mut classification = match self.llm.classify(&sample).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "classification model unavailable, degrading to AUTO manufacturer");
                ClassificationOutput::degraded()
            }
        };

        if classification.manufacturer != DEGRADED_MANUFACTURER {
            match self.discovery.discover(&classification.manufacturer, &classification.models).await {
                Ok(extra) => {
                    for model in extra {
                        if !classification.models.contains(&model) {
                            classification.models.push(model);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "product discovery failed, continuing with the model's own list"),
            }
        }

        context.document_type = Some(classification.document_type);
        context.manufacturer = Some(classification.manufacturer.clone());
        context.models = classification.models.clone();

        let mut data = HashMap::new();
        data.insert("manufacturer".to_string(), serde_json::json!(classification.manufacturer));
        data.insert("document_type".to_string(), serde_json::json!(classification.document_type));
        data.insert("series".to_string(), serde_json::json!(classification.series));
        data.insert("models".to_string(), serde_json::json!(classification.models));
        data.insert("version".to_string(), serde_json::json!(classification.version));
        data.insert("language".to_string(), serde_json::json!(classification.language));
        data.insert("confidence".to_string(), serde_json::json!(classification.confidence));

        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct FixedLlm(ClassificationOutput);

    #[async_trait]
    impl ClassificationLlm for FixedLlm {
        async fn classify(&self, _sample_text: &str) -> Result<ClassificationOutput> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl ClassificationLlm for FailingLlm {
        async fn classify(&self, _sample_text: &str) -> Result<ClassificationOutput> {
            Err(crate::error::Error::Timeout(std::time::Duration::from_secs(30)))
        }
    }

    fn context_with_pages() -> ProcessingContext {
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::Classification);
        let mut pages = HashMap::new();
        pages.insert(0, "Konica Minolta bizhub C454 Service Manual".to_string());
        ctx.page_texts = Some(pages);
        ctx
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_auto_manufacturer() {
        let processor = ClassificationProcessor::new(Arc::new(FailingLlm), Arc::new(NoopProductDiscovery));
        let mut ctx = context_with_pages();
        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(ctx.manufacturer.as_deref(), Some(DEGRADED_MANUFACTURER));
        assert_eq!(ctx.document_type, Some(DocumentType::Unknown));
    }

    #[tokio::test]
    async fn successful_classification_populates_context() {
        let output = ClassificationOutput {
            document_type: DocumentType::ServiceManual,
            manufacturer: "Konica Minolta".to_string(),
            series: Some("bizhub C4xx Series".to_string()),
            models: vec!["C454".to_string()],
            options: Vec::new(),
            version: None,
            confidence: 0.92,
            language: Some("en".to_string()),
        };
        let processor = ClassificationProcessor::new(Arc::new(FixedLlm(output)), Arc::new(NoopProductDiscovery));
        let mut ctx = context_with_pages();
        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(ctx.manufacturer.as_deref(), Some("Konica Minolta"));
        assert_eq!(ctx.models, vec!["C454".to_string()]);
        assert_eq!(ctx.document_type, Some(DocumentType::ServiceManual));
    }
}
