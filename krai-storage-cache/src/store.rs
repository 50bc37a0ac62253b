//! Connection management: one `redb::Database` per store, opened once at
//! startup and shared by every table in this crate.

use std::path::Path;
use std::sync::Arc;

use krai_core::error::{Error, Result};
use redb::Database;

#[derive(Clone)]
pub struct RedbCacheStore {
    pub(crate) db: Arc<Database>,
}

impl RedbCacheStore {
    /// Open (creating if absent) the redb file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::Storage(format!("failed to open redb cache: {e}")))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// A tempfile-backed store for tests, cleaned up on drop.
    #[cfg(test)]
    pub fn temp() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir for redb cache");
        let store = Self::open(&dir.path().join("cache.redb")).expect("open temp redb cache");
        (store, dir)
    }
}
