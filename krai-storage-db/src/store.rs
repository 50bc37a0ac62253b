//! Connection management: one `libsql::Database` per store, a fresh
//! `Connection` per call. Mirrors the teacher's `TursoStorage` constructor
//! shape without its connection-pool/cache layers — out of scope here per
//! the Non-goals (`krai-storage-db` is a thin adapter, not a performance
//! subsystem in its own right).

use std::sync::Arc;

use krai_core::error::{Error, Result};
use libsql::{Builder, Connection, Database};

/// A libsql-backed database handle shared by every trait implementation in
/// this crate.
#[derive(Clone)]
pub struct LibsqlStore {
    db: Arc<Database>,
}

impl LibsqlStore {
    /// Open a database at `url` (`file:path/to.db`, `:memory:`, or a remote
    /// `libsql://` URL with `token`).
    pub async fn open(url: &str, token: &str) -> Result<Self> {
        let db = if url.starts_with("libsql://") || url.starts_with("https://") {
            Builder::new_remote(url.to_string(), token.to_string())
                .build()
                .await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|e| Error::DatabaseUnavailable(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// An in-memory database, for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::open(":memory:", "").await
    }

    pub(crate) fn connection(&self) -> Result<Connection> {
        self.db.connect().map_err(|e| Error::DatabaseUnavailable(e.to_string()))
    }

    /// Create every table and index this crate knows about. Idempotent —
    /// safe to call on every process start.
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        for statement in crate::schema::ALL_STATEMENTS {
            conn.execute(statement, ())
                .await
                .map_err(|e| crate::error::map_libsql_error(e, "schema", (*statement).to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_schema_is_idempotent() {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        store.initialize_schema().await.unwrap();
    }
}
