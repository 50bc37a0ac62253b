//! Storage Stage: materializes one queued artifact into the object
//! store and a relational row. Content-hash dedup plus unique constraints at
//! the DB layer make a second pass over the same queue a no-op.

use std::path::Path;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::idempotency::sha256_hex;
use crate::storage::object_store::ObjectStore;
use crate::storage::relational::{ImageRow, LinkRow, RelationalStore, UpsertOutcome, VideoRow};
use crate::types::{ImageType, ProcessingQueueItem, QueuePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOutcome {
    Inserted,
    AlreadyExists,
}

impl From<UpsertOutcome> for StorageOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => StorageOutcome::Inserted,
            UpsertOutcome::AlreadyExists => StorageOutcome::AlreadyExists,
        }
    }
}

pub struct StorageStage {
    object_store: std::sync::Arc<dyn ObjectStore>,
    relational: std::sync::Arc<dyn RelationalStore>,
}

impl StorageStage {
    #[must_use]
    pub fn new(object_store: std::sync::Arc<dyn ObjectStore>, relational: std::sync::Arc<dyn RelationalStore>) -> Self {
        Self { object_store, relational }
    }

    /// Materialize one queued item. On success, the caller is responsible for
    /// deleting/marking the queue row `completed`; on error, the row must be
    /// left `pending` for the next run of the stage.
    pub async fn process_item(&self, item: &ProcessingQueueItem) -> Result<(Uuid, StorageOutcome)> {
        match &item.payload {
            QueuePayload::Image {
                filename,
                page_number,
                bbox,
                content_base64,
                temp_path,
                svg_storage_url,
                context_caption,
                related_error_codes,
                related_products,
                image_type,
            } => {
                self.store_image(
                    item.document_id,
                    filename,
                    *page_number,
                    *bbox,
                    content_base64.as_deref(),
                    temp_path.as_deref(),
                    svg_storage_url.clone(),
                    context_caption.clone(),
                    related_error_codes.clone(),
                    related_products.clone(),
                    *image_type,
                )
                .await
            }
            QueuePayload::Svg {
                filename,
                page_number,
                bbox,
                extraction_method: _,
                svg_bytes_base64,
                png_bytes_base64,
                context_caption,
                related_error_codes,
                related_products,
            } => {
                let svg_bytes = decode_base64(svg_bytes_base64)?;
                let svg_url = if svg_bytes.is_empty() {
                    None
                } else {
                    Some(self.object_store.put("document_images", "image/svg+xml", &svg_bytes).await?.storage_path)
                };
                self.store_image(
                    item.document_id,
                    filename,
                    *page_number,
                    *bbox,
                    png_bytes_base64.as_deref(),
                    None,
                    svg_url,
                    context_caption.clone(),
                    related_error_codes.clone(),
                    related_products.clone(),
                    ImageType::VectorGraphic,
                )
                .await
            }
            QueuePayload::Link {
                url,
                page_number,
                context_description,
                related_error_codes,
                related_products,
            } => {
                let (id, outcome) = self
                    .relational
                    .upsert_link(LinkRow {
                        document_id: item.document_id,
                        url: url.clone(),
                        page_number: *page_number,
                        context_description: context_description.clone(),
                        related_error_codes: related_error_codes.clone(),
                        related_products: related_products.clone(),
                    })
                    .await?;
                Ok((id, outcome.into()))
            }
            QueuePayload::Video {
                url,
                page_number,
                context_description,
                related_error_codes,
                related_products,
                platform,
                metadata,
            } => {
                let (id, outcome) = self
                    .relational
                    .upsert_video(VideoRow {
                        document_id: item.document_id,
                        url: url.clone(),
                        page_number: *page_number,
                        context_description: context_description.clone(),
                        related_error_codes: related_error_codes.clone(),
                        related_products: related_products.clone(),
                        platform: platform.clone(),
                        youtube_id: extract_youtube_id(url),
                        metadata: metadata.clone(),
                    })
                    .await?;
                Ok((id, outcome.into()))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_image(
        &self,
        document_id: Uuid,
        filename: &str,
        page_number: u32,
        bbox: Option<crate::types::BoundingBox>,
        content_base64: Option<&str>,
        temp_path: Option<&str>,
        svg_storage_url: Option<String>,
        context_caption: Option<String>,
        related_error_codes: Vec<String>,
        related_products: Vec<String>,
        image_type: ImageType,
    ) -> Result<(Uuid, StorageOutcome)> {
        let bytes = resolve_bytes(content_base64, temp_path)?;
        let file_hash = sha256_hex(&bytes);
        let content_type = content_type_for(filename);

        let storage_url = if bytes.is_empty() {
            // No raster bytes (e.g. an SVG kept without a PNG derivative):
            // the image row still carries the SVG's own storage URL.
            svg_storage_url.clone().ok_or_else(|| Error::Storage(format!("no bytes and no SVG URL for {filename}")))?
        } else {
            let put = self.object_store.put("document_images", content_type, &bytes).await?;
            put.public_url.unwrap_or(put.storage_path)
        };

        let (id, outcome) = self
            .relational
            .upsert_image(ImageRow {
                document_id,
                storage_url,
                filename: filename.to_string(),
                page_number,
                bbox,
                image_type,
                file_hash,
                context_caption,
                related_error_codes,
                related_products,
                svg_storage_url,
                has_png_derivative: content_base64.is_some(),
            })
            .await?;
        Ok((id, outcome.into()))
    }
}

fn resolve_bytes(content_base64: Option<&str>, temp_path: Option<&str>) -> Result<Vec<u8>> {
    if let Some(encoded) = content_base64 {
        return decode_base64(encoded);
    }
    if let Some(path) = temp_path {
        return std::fs::read(Path::new(path)).map_err(Error::Io);
    }
    Ok(Vec::new())
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine as _;
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    BASE64_STANDARD.decode(encoded).map_err(|e| Error::Storage(format!("invalid base64 payload: {e}")))
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "image/png"
    }
}

/// Extract a stable YouTube video id from a URL's `v` query parameter, when
/// present. Other hosts fall back to `(document_id, url)` dedup upstream.
fn extract_youtube_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !(host.ends_with("youtube.com") || host.ends_with("youtu.be")) {
        return None;
    }
    if host.ends_with("youtu.be") {
        return parsed.path_segments()?.next().map(str::to_string).filter(|s| !s.is_empty());
    }
    parsed.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_id_from_watch_url() {
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=abc123&t=5"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn youtube_id_from_short_url() {
        assert_eq!(extract_youtube_id("https://youtu.be/xyz789"), Some("xyz789".to_string()));
    }

    #[test]
    fn non_youtube_url_has_no_id() {
        assert_eq!(extract_youtube_id("https://vimeo.com/12345"), None);
    }
}
