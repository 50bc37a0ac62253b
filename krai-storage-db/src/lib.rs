//! libsql-backed persistence for the KRAI engine: every trait `krai-core`
//! defines a storage seam for (`RelationalStore`, `CatalogStore`,
//! `CompletionMarkerStore`, `ErrorLogStore`, `ErrorCodeSink`, `EmbeddingSink`,
//! the search-indexing and multimodal-search collaborators,
//! `StageStatusStore`, `DocumentContextLoader`) is implemented here against
//! one SQLite-shaped database reachable via `libsql`, plus a
//! content-addressable `ObjectStore` over the local filesystem.
//!
//! `krai-core` has no dependency on this crate; everything here exists to be
//! handed to `krai-core` as `Arc<dyn Trait>`.

mod catalog;
mod document;
mod embedding;
mod error;
mod error_log;
mod idempotency;
mod metadata;
mod object_store;
mod queue;
mod relational;
mod search;
mod stage_status;
mod store;
mod table;

pub mod schema;

pub use catalog::LibsqlCatalogStore;
pub use document::LibsqlDocumentStore;
pub use embedding::LibsqlEmbeddingSink;
pub use error::map_libsql_error;
pub use error_log::LibsqlErrorLogStore;
pub use idempotency::LibsqlCompletionMarkerStore;
pub use metadata::LibsqlErrorCodeSink;
pub use object_store::FilesystemObjectStore;
pub use queue::LibsqlProcessingQueue;
pub use relational::LibsqlRelationalStore;
pub use search::{
    LibsqlDocumentInfoLookup, LibsqlDocumentReadinessStore, LibsqlIndexingAnalyticsSink, LibsqlSearchIndexCounts,
    LibsqlVectorSearchBackend,
};
pub use stage_status::{LibsqlDocumentContextLoader, LibsqlStageStatusStore};
pub use store::LibsqlStore;
pub use table::LibsqlTableSink;
