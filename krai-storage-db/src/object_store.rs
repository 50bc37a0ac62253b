//! Content-addressable object storage over the local filesystem: backs
//! [`krai_core::storage::ObjectStore`]. Objects are written under
//! `<root>/<bucket>/<content_hash>` keyed by the sha256 of their bytes, so
//! `put` is naturally idempotent — the same bytes always land at the same
//! path.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;

use krai_core::error::{Error, Result};
use krai_core::storage::{ObjectStore, PutResult};

pub struct FilesystemObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FilesystemObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self { root: root.into(), public_base_url }
    }

    fn path_for(&self, bucket: &str, content_hash: &str) -> PathBuf {
        self.root.join(bucket).join(content_hash)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, bucket: &str, _content_type: &str, bytes: &[u8]) -> Result<PutResult> {
        let content_hash = sha256_hex(bytes);
        let path = self.path_for(bucket, &content_hash);

        if !fs::try_exists(&path).await.map_err(|e| Error::Storage(e.to_string()))? {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| Error::Storage(e.to_string()))?;
            }
            fs::write(&path, bytes).await.map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(PutResult {
            storage_path: path.to_string_lossy().into_owned(),
            public_url: self.public_base_url.as_ref().map(|base| format!("{base}/{bucket}/{content_hash}")),
            content_hash,
        })
    }

    async fn exists(&self, bucket: &str, content_hash: &str) -> Result<bool> {
        fs::try_exists(self.path_for(bucket, content_hash)).await.map_err(|e| Error::Storage(e.to_string()))
    }

    async fn public_url(&self, bucket: &str, content_hash: &str) -> Option<String> {
        self.public_base_url.as_ref().map(|base| format!("{base}/{bucket}/{content_hash}"))
    }
}
