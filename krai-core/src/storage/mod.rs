//! Storage Stage: the sole consumer of the processing queue, plus the
//! object-store/relational-store seams the rest of the engine uploads
//! through directly (content-addressable PUTs are idempotent, so collisions
//! between concurrent callers are benign).

mod document;
mod object_store;
mod queue;
mod relational;
mod stage;

pub use document::DocumentStore;
pub use object_store::{ObjectStore, PutResult};
pub use queue::ProcessingQueueStore;
pub use relational::{ImageRow, LinkRow, RelationalStore, UpsertOutcome, VideoRow};
pub use stage::{StorageOutcome, StorageStage};
