//! Parts Extraction (stage 11): manufacturer-keyed part numbers pulled
//! from chunk text, categorized from surrounding keywords, and linked to
//! whichever error codes were found in the same chunk.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::classification::{CatalogStore, DEGRADED_MANUFACTURER};
use crate::error::{Error, Result};
use crate::patterns;
use crate::processor::Processor;
use crate::types::{Chunk, ErrorCode, ExtractionSource, PartCategory, ProcessingContext, ProcessingResult, Stage};

const CONSUMABLE_KEYWORDS: &[&str] = &["toner", "drum", "cartridge", "ink"];
const ASSEMBLY_KEYWORDS: &[&str] = &["assembly", "unit"];
const COMPONENT_KEYWORDS: &[&str] = &["sensor", "motor", "board", "pcb"];
const MECHANICAL_KEYWORDS: &[&str] = &["roller", "gear", "belt"];
const ELECTRICAL_KEYWORDS: &[&str] = &["cable", "harness", "connector"];

/// Classify a part's category from keywords in the text surrounding its
/// mention. Order matters: a "toner cartridge assembly" is consumable
/// first, since that's what gets replaced.
#[must_use]
pub fn classify_category(context_text: &str) -> Option<PartCategory> {
    let lower = context_text.to_lowercase();
    if CONSUMABLE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Some(PartCategory::Consumable)
    } else if ASSEMBLY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Some(PartCategory::Assembly)
    } else if COMPONENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Some(PartCategory::Component)
    } else if MECHANICAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Some(PartCategory::Mechanical)
    } else if ELECTRICAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Some(PartCategory::Electrical)
    } else {
        None
    }
}

/// Short human-readable name for a part ("Fuser Unit", "Transfer Belt"),
/// recovered from the sentence preceding its part number — independent of
/// `classify_category`, since a part's name doesn't imply its replacement
/// class. Tries a few common phrasings in order and returns the first match.
#[must_use]
pub fn extract_part_name(context_text: &str, part_number: &str) -> Option<String> {
    let escaped = regex::escape(part_number);
    let templates = [
        format!(r"(?i)(?:replace|install|use|order)\s+(?:the\s+)?([a-z\s]{{5,40}}?)\s*[-\x{{2013}}\x{{2014}}:]\s*{escaped}"),
        format!(r"(?i)([a-z][a-z\s]{{5,40}}?)\s*[-\x{{2013}}\x{{2014}}:]\s*{escaped}"),
        format!(r"(?i)(?:part|component|assembly)\s*:\s*([a-z\s]{{5,40}}?)\s*[-\x{{2013}}\x{{2014}}]?\s*{escaped}"),
    ];
    for template in &templates {
        let Ok(re) = Regex::new(template) else {
            continue;
        };
        if let Some(name) = re.captures(context_text).and_then(|caps| caps.get(1)) {
            let cleaned = name.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            if !cleaned.is_empty() {
                return Some(cleaned.chars().take(100).collect());
            }
        }
    }
    None
}

fn part_description(chunk_text: &str, part_number: &str) -> String {
    let Some(pos) = chunk_text.find(part_number) else {
        return chunk_text.trim().to_string();
    };
    let start = chunk_text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = chunk_text[pos..].find('\n').map_or(chunk_text.len(), |i| pos + i);
    chunk_text[start..end].trim().to_string()
}

pub struct PartsExtractionProcessor {
    catalog: Arc<dyn CatalogStore>,
}

impl PartsExtractionProcessor {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    async fn link_codes_in_chunk(&self, chunk: &Chunk, error_codes: &[ErrorCode], part_id: uuid::Uuid) -> u64 {
        let mut linked = 0;
        for code in error_codes.iter().filter(|c| c.chunk_id == Some(chunk.id)) {
            match self
                .catalog
                .link_error_code_to_part(code.id, part_id, REGEX_CO_OCCURRENCE_RELEVANCE, ExtractionSource::Chunk)
                .await
            {
                Ok(()) => linked += 1,
                Err(Error::UniqueViolation { .. }) => {}
                Err(e) => tracing::warn!(error = %e, "failed to link error code to part"),
            }
        }
        linked
    }
}

/// Relevance assigned when a part and an error code are merely found in the
/// same chunk; there is no stronger signal available without an LLM pass.
const REGEX_CO_OCCURRENCE_RELEVANCE: f32 = 0.5;

#[async_trait]
impl Processor for PartsExtractionProcessor {
    fn name(&self) -> &'static str {
        "parts_extraction"
    }

    fn stage(&self) -> Stage {
        Stage::PartsExtraction
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["chunks"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["parts", "error_code_part_links"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let manufacturer = context.manufacturer.clone().unwrap_or_else(|| DEGRADED_MANUFACTURER.to_string());
        let mut data = HashMap::new();

        if manufacturer == DEGRADED_MANUFACTURER {
            tracing::info!("manufacturer unresolved, skipping parts extraction");
            data.insert("parts_found".to_string(), serde_json::json!(0));
            return Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0));
        }

        let manufacturer_id = self.catalog.upsert_manufacturer(&manufacturer).await?;
        let chunks = context.chunks.clone().unwrap_or_default();
        let error_codes = context.error_codes.clone().unwrap_or_default();

        let mut parts_found = 0u64;
        let mut links_created = 0u64;

        for chunk in &chunks {
            for part_number in patterns::part_numbers_for(&manufacturer, &chunk.text) {
                let description = part_description(&chunk.text, &part_number);
                let category = classify_category(&description);
                let name = extract_part_name(&description, &part_number);

                let part_id = match self.catalog.find_part(manufacturer_id, &part_number).await? {
                    Some(existing) if existing.description.len() >= description.len() => existing.id,
                    Some(existing) => {
                        self.catalog.update_part_description(existing.id, &description).await?;
                        existing.id
                    }
                    None => {
                        self.catalog
                            .insert_part(manufacturer_id, &part_number, name.as_deref(), &description, category)
                            .await?
                    }
                };
                parts_found += 1;
                links_created += self.link_codes_in_chunk(chunk, &error_codes, part_id).await;
            }
        }

        data.insert("parts_found".to_string(), serde_json::json!(parts_found));
        data.insert("error_code_links_created".to_string(), serde_json::json!(links_created));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Part;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn consumable_keyword_wins_over_assembly() {
        assert_eq!(classify_category("toner cartridge assembly"), Some(PartCategory::Consumable));
    }

    #[test]
    fn mechanical_keyword_classified() {
        assert_eq!(classify_category("replace the fuser drive belt"), Some(PartCategory::Mechanical));
    }

    #[test]
    fn unknown_text_has_no_category() {
        assert_eq!(classify_category("see page 12 for details"), None);
    }

    #[test]
    fn extracts_name_preceding_a_dash_separated_part_number() {
        let name = extract_part_name("Fuser Unit - RM2-5399", "RM2-5399");
        assert_eq!(name.as_deref(), Some("Fuser Unit"));
    }

    #[test]
    fn extracts_name_after_replace_the_phrasing() {
        let name = extract_part_name("Replace the transfer belt: FM3-1234-000", "FM3-1234-000");
        assert_eq!(name.as_deref(), Some("transfer belt"));
    }

    #[test]
    fn no_name_pattern_match_returns_none() {
        assert_eq!(extract_part_name("see (part A0X1-1234) in the diagram", "A0X1-1234"), None);
    }

    struct FakeCatalog {
        parts: Mutex<HashMap<(Uuid, String), Part>>,
        links: Mutex<Vec<(Uuid, Uuid)>>,
    }

    impl FakeCatalog {
        fn new() -> Self {
            Self { parts: Mutex::new(HashMap::new()), links: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl CatalogStore for FakeCatalog {
        async fn upsert_manufacturer(&self, _name: &str) -> Result<Uuid> {
            Ok(Uuid::new_v4())
        }
        async fn upsert_product(&self, _manufacturer_id: Uuid, _model_number: &str) -> Result<Uuid> {
            Ok(Uuid::new_v4())
        }
        async fn insert_series(&self, _manufacturer_id: Uuid, _series_name: &str, _model_pattern: &str) -> Result<Uuid> {
            Ok(Uuid::new_v4())
        }
        async fn find_series(&self, _manufacturer_id: Uuid, _series_name: &str, _model_pattern: &str) -> Result<Option<Uuid>> {
            Ok(None)
        }
        async fn link_product_to_series(&self, _product_id: Uuid, _series_id: Uuid) -> Result<()> {
            Ok(())
        }
        async fn find_part(&self, manufacturer_id: Uuid, part_number: &str) -> Result<Option<Part>> {
            Ok(self.parts.lock().unwrap().get(&(manufacturer_id, part_number.to_string())).cloned())
        }
        async fn insert_part(
            &self,
            manufacturer_id: Uuid,
            part_number: &str,
            name: Option<&str>,
            description: &str,
            category: Option<PartCategory>,
        ) -> Result<Uuid> {
            let id = Uuid::new_v4();
            self.parts.lock().unwrap().insert(
                (manufacturer_id, part_number.to_string()),
                Part {
                    id,
                    part_number: part_number.to_string(),
                    manufacturer_id,
                    name: name.map(ToString::to_string),
                    description: description.to_string(),
                    category,
                },
            );
            Ok(id)
        }
        async fn update_part_description(&self, part_id: Uuid, description: &str) -> Result<()> {
            for part in self.parts.lock().unwrap().values_mut() {
                if part.id == part_id {
                    part.description = description.to_string();
                }
            }
            Ok(())
        }
        async fn link_error_code_to_part(&self, error_code_id: Uuid, part_id: Uuid, _relevance_score: f32, _source: ExtractionSource) -> Result<()> {
            self.links.lock().unwrap().push((error_code_id, part_id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn degraded_manufacturer_skips_extraction() {
        let processor = PartsExtractionProcessor::new(Arc::new(FakeCatalog::new()));
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::PartsExtraction);
        ctx.manufacturer = Some(DEGRADED_MANUFACTURER.to_string());
        ctx.chunks = Some(vec![Chunk::new(ctx.document_id, 0, "part A0X1-1234".to_string(), 1, 1)]);
        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["parts_found"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn finds_part_and_links_co_occurring_error_code() {
        let catalog = Arc::new(FakeCatalog::new());
        let processor = PartsExtractionProcessor::new(catalog.clone());
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), Stage::PartsExtraction);
        ctx.manufacturer = Some("HP".to_string());
        let chunk = Chunk::new(
            ctx.document_id,
            0,
            "Error E042 sensor fault.\nReplace fuser unit (part A0X1-1234).".to_string(),
            2,
            2,
        );
        ctx.error_codes = Some(vec![ErrorCode {
            id: Uuid::new_v4(),
            document_id: ctx.document_id,
            chunk_id: Some(chunk.id),
            code: "E042".to_string(),
            description: "Error E042 sensor fault".to_string(),
            solution: None,
            page_number: 2,
            confidence: 0.75,
            severity: crate::types::Severity::Medium,
            extraction_method: crate::types::ExtractionMethod::Regex,
            requires_technician: false,
            requires_parts: true,
        }]);
        ctx.chunks = Some(vec![chunk]);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["parts_found"], serde_json::json!(1));
        assert_eq!(catalog.links.lock().unwrap().len(), 1);
    }
}
