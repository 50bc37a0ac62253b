//! Content-addressable object storage seam, shared by the SVG stage (which
//! uploads originals directly) and the Storage stage (which materializes
//! queued raster/table artifacts).

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a [`ObjectStore::put`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub storage_path: String,
    pub public_url: Option<String>,
    pub content_hash: String,
}

/// A content-addressable object store. `put` is idempotent: uploading the
/// same bytes under the same bucket twice returns the same `storage_path`
/// without re-uploading, so collisions between concurrent workers are benign.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, content_type: &str, bytes: &[u8]) -> Result<PutResult>;

    async fn exists(&self, bucket: &str, content_hash: &str) -> Result<bool>;

    async fn public_url(&self, bucket: &str, content_hash: &str) -> Option<String>;
}
