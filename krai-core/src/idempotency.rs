//! Stage-level and content-level idempotency.

use crate::error::Result;
use crate::types::{ProcessingContext, StageCompletionMarker};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// `sha256(bytes)` as lowercase hex — the basis for both content-addressable
/// storage keys and chunk fingerprints.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A deterministic SHA-256 over a canonical encoding of the context fields
/// that materially influence a stage's output: document id, file hash, chunk
/// fingerprints (if chunks are already attached), and the processing config.
/// Computed without touching the database, so idempotency checks never
/// require a round trip before deciding whether to run at all.
#[must_use]
pub fn compute_data_hash(context: &ProcessingContext) -> String {
    let mut canonical = serde_json::json!({
        "document_id": context.document_id,
        "file_hash": context.file_hash,
        "processing_config": canonical_config(context),
    });

    if let Some(chunks) = &context.chunks {
        let fingerprints: Vec<&str> = chunks.iter().map(|c| c.fingerprint.as_str()).collect();
        canonical["chunk_fingerprints"] = serde_json::json!(fingerprints);
    }

    sha256_hex(canonical.to_string().as_bytes())
}

/// `serde_json::Value`'s `Display` does not sort object keys, so two
/// semantically-identical configs built in a different insertion order would
/// hash differently. Re-serialize through a `BTreeMap` to normalize key order
/// before hashing.
fn canonical_config(context: &ProcessingContext) -> serde_json::Value {
    let sorted: std::collections::BTreeMap<&String, &serde_json::Value> =
        context.processing_config.iter().collect();
    serde_json::json!(sorted)
}

/// What the idempotency check decided to do before a stage runs.
#[derive(Debug, Clone)]
pub enum IdempotencyDecision {
    /// No marker, or a marker with a different `data_hash`: proceed to run
    /// the stage. `stale` carries the old marker when cleanup is needed.
    Run { stale: Option<StageCompletionMarker> },
    /// A marker exists with a matching `data_hash`: skip the stage entirely.
    SkipAlreadyProcessed,
}

/// Storage seam for completion markers, implemented by `krai-storage-db`.
#[async_trait]
pub trait CompletionMarkerStore: Send + Sync {
    async fn get_marker(
        &self,
        document_id: uuid::Uuid,
        stage_name: &str,
    ) -> Result<Option<StageCompletionMarker>>;

    async fn set_marker(&self, marker: StageCompletionMarker) -> Result<()>;

    /// Remove the marker for `(document_id, stage_name)`. Called before a
    /// stage re-runs after its data hash changed; stage-specific row
    /// cleanup beyond the marker is the stage's own responsibility.
    async fn delete_marker(&self, document_id: uuid::Uuid, stage_name: &str) -> Result<()>;
}

/// Decide whether a stage should run under stage-level idempotency: skip if
/// a completion marker already matches this context's data hash.
pub async fn check(
    store: &dyn CompletionMarkerStore,
    context: &ProcessingContext,
    stage_name: &str,
) -> Result<IdempotencyDecision> {
    let Some(marker) = store.get_marker(context.document_id, stage_name).await? else {
        return Ok(IdempotencyDecision::Run { stale: None });
    };

    if marker.data_hash == compute_data_hash(context) {
        Ok(IdempotencyDecision::SkipAlreadyProcessed)
    } else {
        Ok(IdempotencyDecision::Run {
            stale: Some(marker),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn data_hash_is_order_independent_over_config() {
        let document_id = Uuid::new_v4();
        let mut a = ProcessingContext::new(document_id, crate::types::Stage::Embedding);
        a.processing_config
            .insert("b".to_string(), serde_json::json!(2));
        a.processing_config
            .insert("a".to_string(), serde_json::json!(1));

        let mut b = ProcessingContext::new(document_id, crate::types::Stage::Embedding);
        b.processing_config
            .insert("a".to_string(), serde_json::json!(1));
        b.processing_config
            .insert("b".to_string(), serde_json::json!(2));

        assert_eq!(compute_data_hash(&a), compute_data_hash(&b));
    }

    #[test]
    fn data_hash_changes_when_file_hash_changes() {
        let document_id = Uuid::new_v4();
        let mut a = ProcessingContext::new(document_id, crate::types::Stage::Embedding);
        a.file_hash = Some("aaa".to_string());
        let mut b = a.clone();
        b.file_hash = Some("bbb".to_string());
        assert_ne!(compute_data_hash(&a), compute_data_hash(&b));
    }
}
