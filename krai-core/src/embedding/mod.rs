//! Embedding Stage: adaptive-batch embedding of chunks, tables, and
//! image contexts into `unified_embeddings`.

mod batch;
mod stage;

pub use batch::AdaptiveBatcher;
pub use stage::{EmbeddingConfig, EmbeddingSink, EmbeddingStage, ModelClient};
