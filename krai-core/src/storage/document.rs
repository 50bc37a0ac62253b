//! The `documents` write path the Upload stage persists through. Reading a
//! document back into a [`crate::types::ProcessingContext`] is
//! [`crate::pipeline::DocumentContextLoader`]'s job, not this trait's.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Document;

/// `file_hash` is unique: a second upload of identical content must resolve
/// to the existing row's id rather than creating a new one.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Uuid>>;

    /// Insert a new row under `document.id`. Implementations may surface
    /// [`crate::error::Error::UniqueViolation`] on a `file_hash` race; callers
    /// recover by re-checking [`Self::find_by_hash`].
    async fn insert(&self, document: Document) -> Result<()>;
}
