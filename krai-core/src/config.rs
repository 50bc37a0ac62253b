//! Environment-driven configuration, built once at startup and passed by
//! value into processors and services. No module reads the environment
//! anywhere else.

use std::env;

use crate::embedding::EmbeddingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfEngine {
    PymupdfEquiv,
    PdfplumberEquiv,
}

/// Chunker toggles.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub hierarchical: bool,
    pub detect_error_code_sections: bool,
    pub link_chunks: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 150,
            hierarchical: true,
            detect_error_code_sections: true,
            link_chunks: true,
        }
    }
}

/// The full set of environment-driven toggles recognized by the engine.
/// Unknown env var names are ignored.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pdf_engine: PdfEngine,
    pub enable_ocr_fallback: bool,
    pub chunker: ChunkerConfig,
    pub enable_svg_extraction: bool,
    pub enable_table_extraction: bool,
    pub enable_context_extraction: bool,
    pub svg_inline_storage_threshold_kb: u64,
    pub disable_vision_processing: bool,
    pub enable_brightcove_enrichment: bool,
    pub brightcove_enrichment_batch_size: usize,
    pub embedding: EmbeddingConfig,
    pub object_storage: ObjectStorageConfig,
    pub database_url: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model_vision: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectStorageConfig {
    pub storage_type: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub use_ssl: bool,
    pub bucket_document_images: String,
    pub bucket_documents: String,
    pub bucket_thumbnails: String,
    pub public_url_base: Option<String>,
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl EngineConfig {
    /// Build the config once from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let pdf_engine = match env::var("PDF_ENGINE").as_deref() {
            Ok("pdfplumber_equiv") => PdfEngine::PdfplumberEquiv,
            _ => PdfEngine::PymupdfEquiv,
        };

        let chunker = ChunkerConfig {
            hierarchical: env_bool("ENABLE_HIERARCHICAL_CHUNKING", ChunkerConfig::default().hierarchical),
            detect_error_code_sections: env_bool(
                "DETECT_ERROR_CODE_SECTIONS",
                ChunkerConfig::default().detect_error_code_sections,
            ),
            link_chunks: env_bool("LINK_CHUNKS", ChunkerConfig::default().link_chunks),
            ..ChunkerConfig::default()
        };

        let object_storage = ObjectStorageConfig {
            storage_type: env_string("OBJECT_STORAGE_TYPE"),
            endpoint: env_string("OBJECT_STORAGE_ENDPOINT"),
            access_key: env_string("OBJECT_STORAGE_ACCESS_KEY"),
            secret_key: env_string("OBJECT_STORAGE_SECRET_KEY"),
            region: env_string("OBJECT_STORAGE_REGION"),
            use_ssl: env_bool("OBJECT_STORAGE_USE_SSL", true),
            bucket_document_images: env_string("OBJECT_STORAGE_BUCKET_DOCUMENT_IMAGES")
                .unwrap_or_else(|| "document_images".to_string()),
            bucket_documents: env_string("OBJECT_STORAGE_BUCKET_DOCUMENTS")
                .unwrap_or_else(|| "documents".to_string()),
            bucket_thumbnails: env_string("OBJECT_STORAGE_BUCKET_THUMBNAILS")
                .unwrap_or_else(|| "thumbnails".to_string()),
            public_url_base: env_string("OBJECT_STORAGE_PUBLIC_URL"),
        };

        Self {
            pdf_engine,
            enable_ocr_fallback: env_bool("ENABLE_OCR_FALLBACK", false),
            chunker,
            enable_svg_extraction: env_bool("ENABLE_SVG_EXTRACTION", true),
            enable_table_extraction: env_bool("ENABLE_TABLE_EXTRACTION", true),
            enable_context_extraction: env_bool("ENABLE_CONTEXT_EXTRACTION", true),
            svg_inline_storage_threshold_kb: env_u64("SVG_INLINE_STORAGE_THRESHOLD_KB", 50),
            disable_vision_processing: env_bool("DISABLE_VISION_PROCESSING", false),
            enable_brightcove_enrichment: env_bool("ENABLE_BRIGHTCOVE_ENRICHMENT", false),
            brightcove_enrichment_batch_size: env_usize("BRIGHTCOVE_ENRICHMENT_BATCH_SIZE", 10),
            embedding: EmbeddingConfig::default(),
            object_storage,
            database_url: env_string("DATABASE_URL"),
            ollama_url: env_string("OLLAMA_URL"),
            ollama_model_vision: env_string("OLLAMA_MODEL_VISION"),
        }
    }

    /// Fail fast on the subset of configuration that is fatal when absent:
    /// a database unavailable at startup, or configuration missing outright.
    pub fn require_database_url(&self) -> crate::error::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| crate::error::Error::Configuration("DATABASE_URL is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let chunker = ChunkerConfig::default();
        assert!(chunker.chunk_size > chunker.overlap);
        let embedding = EmbeddingConfig::default();
        assert!(embedding.min_batch_size < embedding.initial_batch_size);
        assert!(embedding.initial_batch_size <= embedding.max_batch_size);
    }
}
