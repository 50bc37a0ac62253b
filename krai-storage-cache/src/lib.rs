//! `redb`-backed cache layer for the KRAI engine: advisory locks,
//! background-retry durability records, and completion-marker read-through
//! caching. Purely a local performance/durability aid — `krai-storage-db`
//! remains the source of truth for every table it owns.

mod lock;
mod marker_cache;
mod retry_queue;
mod store;

pub use lock::RedbAdvisoryLock;
pub use marker_cache::CachingCompletionMarkerStore;
pub use retry_queue::RedbBackgroundRetryQueue;
pub use store::RedbCacheStore;
