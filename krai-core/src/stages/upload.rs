//! Upload (stage 1): hashes the incoming file for content-addressable dedup
//! and persists the `documents` row the rest of the pipeline hangs off of.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::idempotency::sha256_hex;
use crate::processor::Processor;
use crate::storage::DocumentStore;
use crate::types::{Document, ProcessingContext, ProcessingResult, Stage};

pub struct UploadProcessor {
    store: Arc<dyn DocumentStore>,
}

impl UploadProcessor {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Processor for UploadProcessor {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn stage(&self) -> Stage {
        Stage::Upload
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["file_path"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["documents"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let path = context
            .file_path
            .clone()
            .ok_or_else(|| Error::MissingInput("file_path".to_string()))?;
        let bytes = std::fs::read(&path)?;
        let file_hash = sha256_hex(&bytes);
        let size = bytes.len() as u64;

        let document_id = match self.store.find_by_hash(&file_hash).await? {
            Some(existing) => {
                tracing::info!(existing = %existing, "file hash already uploaded, reusing existing document");
                existing
            }
            None => self.insert_new(&path, &file_hash, size, context).await?,
        };

        context.document_id = document_id;
        context.file_hash = Some(file_hash.clone());
        context.file_size = Some(size);

        let mut data = HashMap::new();
        data.insert("document_id".to_string(), serde_json::json!(document_id));
        data.insert("file_hash".to_string(), serde_json::json!(file_hash));
        data.insert("size".to_string(), serde_json::json!(size));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

impl UploadProcessor {
    async fn insert_new(
        &self,
        path: &str,
        file_hash: &str,
        size: u64,
        context: &ProcessingContext,
    ) -> Result<uuid::Uuid> {
        let filename = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("document")
            .to_string();

        let mut document = Document::new(file_hash.to_string(), filename, size);
        document.id = context.document_id;

        match self.store.insert(document).await {
            Ok(()) => Ok(context.document_id),
            Err(Error::UniqueViolation { .. }) => self
                .store
                .find_by_hash(file_hash)
                .await?
                .ok_or_else(|| Error::ContractViolation("upload race left no document row behind the unique violation".to_string())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct InMemoryStore {
        by_hash: Mutex<HashMap<String, Uuid>>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self { by_hash: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl DocumentStore for InMemoryStore {
        async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Uuid>> {
            Ok(self.by_hash.lock().unwrap().get(file_hash).copied())
        }

        async fn insert(&self, document: Document) -> Result<()> {
            let mut guard = self.by_hash.lock().unwrap();
            if guard.contains_key(&document.file_hash) {
                return Err(Error::UniqueViolation { table: "documents", key: document.file_hash });
            }
            guard.insert(document.file_hash, document.id);
            Ok(())
        }
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[tokio::test]
    async fn first_upload_inserts_under_the_context_document_id() {
        let store = Arc::new(InMemoryStore::new());
        let processor = UploadProcessor::new(store.clone());
        let file = write_temp(b"hello world");
        let document_id = Uuid::new_v4();
        let mut ctx = ProcessingContext::new(document_id, Stage::Upload);
        ctx.file_path = Some(file.path().to_str().unwrap().to_string());

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(ctx.document_id, document_id);
        assert_eq!(ctx.file_size, Some(11));
        assert!(store.by_hash.lock().unwrap().values().any(|id| *id == document_id));
    }

    #[tokio::test]
    async fn reuploading_identical_bytes_resolves_to_the_existing_document() {
        let store = Arc::new(InMemoryStore::new());
        let processor = UploadProcessor::new(store.clone());
        let file = write_temp(b"duplicate content");

        let mut first = ProcessingContext::new(Uuid::new_v4(), Stage::Upload);
        first.file_path = Some(file.path().to_str().unwrap().to_string());
        processor.process(&mut first).await.unwrap();

        let mut second = ProcessingContext::new(Uuid::new_v4(), Stage::Upload);
        second.file_path = Some(file.path().to_str().unwrap().to_string());
        processor.process(&mut second).await.unwrap();

        assert_eq!(second.document_id, first.document_id);
        assert_eq!(store.by_hash.lock().unwrap().len(), 1);
    }
}
