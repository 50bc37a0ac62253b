//! HTTP client for a local Ollama model server: the concrete
//! [`ClassificationLlm`], [`ModelClient`], [`VisionModelClient`],
//! [`QueryEmbedder`] and [`AnswerGenerator`] implementation used whenever
//! `OLLAMA_URL` is configured. Every other processor falls back to a `Noop*`
//! stand-in when it isn't.
//!
//! Ollama has no image-embedding endpoint, so [`embed_image`] asks the
//! vision model to describe the image via `/api/generate` and embeds that
//! description through `/api/embeddings` — two round trips standing in for
//! one.
//!
//! [`embed_image`]: VisionModelClient::embed_image

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::classification::{ClassificationLlm, ClassificationOutput};
use crate::config::EngineConfig;
use crate::embedding::ModelClient;
use crate::error::{Error, Result};
use crate::search::{AnswerGenerator, QueryEmbedder};
use crate::stages::VisionModelClient;
use crate::types::DocumentType;

const SERVICE_NAME: &str = "ollama";
const DEFAULT_TEXT_MODEL: &str = "llama3.2:latest";
const DEFAULT_EMBEDDING_MODEL: &str = "embeddinggemma:latest";
const DEFAULT_VISION_MODEL: &str = "llava:latest";

/// Substring Ollama puts in both its HTTP error bodies and raised exceptions
/// when the GPU can't currently serve a model. Worth one retry; anything
/// else isn't.
const RESOURCE_LIMITATION_MARKER: &str = "resource limitations";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    text_model: String,
    embedding_model: String,
    vision_model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Builds a client from `config.ollama_url`/`config.ollama_model_vision`.
    /// Errors with [`Error::Configuration`] if no URL is set — callers
    /// should fall back to the `Noop*` collaborators instead of calling this.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let base_url = config
            .ollama_url
            .clone()
            .ok_or_else(|| Error::Configuration("OLLAMA_URL is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build Ollama HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            vision_model: config.ollama_model_vision.clone().unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        })
    }

    /// `GET /api/tags`: the connection check run once at startup.
    pub async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::network(SERVICE_NAME, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Storage(format!("Ollama connection test failed: {}", response.status())))
        }
    }

    /// `POST /api/generate`, retrying once on a resource-limitation error —
    /// vision models in particular can be evicted from VRAM mid-call.
    async fn call_model(&self, model: &str, prompt: &str, images: Option<Vec<Vec<u8>>>) -> Result<String> {
        let images_b64 = images.map(|imgs| imgs.iter().map(|b| BASE64_STANDARD.encode(b)).collect::<Vec<_>>());
        let keep_alive = if images_b64.is_some() { Some("10m") } else { None };
        let max_attempts = if images_b64.is_some() { 2 } else { 1 };
        let url = format!("{}/api/generate", self.base_url);

        let mut last_err = None;
        for attempt in 0..max_attempts {
            let request = GenerateRequest {
                model,
                prompt,
                stream: false,
                images: images_b64.clone(),
                keep_alive,
            };
            let response = self.client.post(&url).json(&request).send().await.map_err(|e| Error::network(SERVICE_NAME, e))?;

            if response.status().is_success() {
                let body: GenerateResponse = response.json().await.map_err(|e| Error::network(SERVICE_NAME, e))?;
                return Ok(body.response);
            }

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if attempt + 1 < max_attempts && body.contains(RESOURCE_LIMITATION_MARKER) {
                tracing::warn!(model, attempt, %status, "ollama resource limitation, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
                last_err = Some(Error::ResourceLimited(body));
                continue;
            }
            return Err(Error::Storage(format!("Ollama API error {status}: {body}")));
        }
        Err(last_err.unwrap_or_else(|| Error::Storage("Ollama generate exhausted retries".to_string())))
    }

    /// `POST /api/embeddings` for a single string. Ollama has no batch
    /// embedding endpoint, so batching is one call per text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest { model: &self.embedding_model, prompt: text };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::network(SERVICE_NAME, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!("Ollama embeddings API error {status}: {body}")));
        }
        let body: EmbeddingResponse = response.json().await.map_err(|e| Error::network(SERVICE_NAME, e))?;
        Ok(body.embedding)
    }

    fn classification_prompt(sample_text: &str) -> String {
        format!(
            "Analyze this technical document and classify it. Return ONLY a JSON object with: \
             document_type (service_manual, parts_catalog, bulletin, or unknown), \
             manufacturer (exact manufacturer name), series (product series name or null), \
             models (array of all model numbers found), options (array of accessory/option model \
             numbers), version (document version or null), confidence (0-1), language \
             (document language).\n\nDocument text: {sample_text}"
        )
    }

    fn parse_document_type(raw: &str) -> DocumentType {
        match raw.trim().to_ascii_lowercase().as_str() {
            "service_manual" => DocumentType::ServiceManual,
            "parts_catalog" => DocumentType::PartsCatalog,
            "bulletin" | "technical_bulletin" => DocumentType::Bulletin,
            _ => DocumentType::Unknown,
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    document_type: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    models: Vec<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    language: Option<String>,
}

#[async_trait]
impl ClassificationLlm for OllamaClient {
    async fn classify(&self, sample_text: &str) -> Result<ClassificationOutput> {
        let truncated: String = sample_text.chars().take(3000).collect();
        let prompt = Self::classification_prompt(&truncated);
        let response_text = self.call_model(&self.text_model, &prompt, None).await?;

        let raw: RawClassification = serde_json::from_str(response_text.trim()).map_err(|e| {
            tracing::warn!(error = %e, "ollama classification response was not valid JSON, degrading");
            e
        }).unwrap_or(RawClassification {
            document_type: String::new(),
            manufacturer: String::new(),
            series: None,
            models: Vec::new(),
            options: Vec::new(),
            version: None,
            confidence: 0.0,
            language: None,
        });

        if raw.manufacturer.is_empty() {
            return Ok(ClassificationOutput::degraded());
        }

        Ok(ClassificationOutput {
            document_type: Self::parse_document_type(&raw.document_type),
            manufacturer: raw.manufacturer,
            series: raw.series,
            models: raw.models,
            options: raw.options,
            version: raw.version,
            confidence: raw.confidence,
            language: raw.language,
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl VisionModelClient for OllamaClient {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let description = self
            .call_model(&self.vision_model, "Describe this image in detail for semantic search.", Some(vec![bytes.to_vec()]))
            .await?;
        self.embed_one(&description).await
    }
}

#[async_trait]
impl QueryEmbedder for OllamaClient {
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_one(query).await
    }
}

#[async_trait]
impl AnswerGenerator for OllamaClient {
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String> {
        let joined = context.join("\n---\n");
        let full_prompt = format!("{prompt}\n\nContext:\n{joined}");
        self.call_model(&self.text_model, &full_prompt, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_ollama_url() {
        let config = EngineConfig::from_env();
        let result = OllamaClient::from_config(&config);
        assert!(result.is_err() || config.ollama_url.is_some());
    }

    #[test]
    fn document_type_parsing_recognizes_all_known_variants() {
        assert_eq!(OllamaClient::parse_document_type("service_manual"), DocumentType::ServiceManual);
        assert_eq!(OllamaClient::parse_document_type("PARTS_CATALOG"), DocumentType::PartsCatalog);
        assert_eq!(OllamaClient::parse_document_type("technical_bulletin"), DocumentType::Bulletin);
        assert_eq!(OllamaClient::parse_document_type("cpmd_database"), DocumentType::Unknown);
    }

    #[test]
    fn classification_prompt_embeds_the_sample_text() {
        let prompt = OllamaClient::classification_prompt("M404dn service manual excerpt");
        assert!(prompt.contains("M404dn service manual excerpt"));
        assert!(prompt.contains("document_type"));
    }
}
