//! Stage enumeration, per-invocation context, result shape, and the
//! relational entities the engine reasons about.

pub mod catalog;
pub mod chunk;
pub mod context;
pub mod document;
pub mod embedding;
pub mod media;
pub mod queue;
pub mod stage;

pub use catalog::{
    ErrorCode, ErrorCodePartLink, ExtractionMethod, ExtractionSource, Manufacturer, Part,
    PartCategory, Product, ProductSeries, Severity,
};
pub use chunk::{BoundingBox, Chunk, ChunkMetadata, ChunkType, StructuredTable};
pub use context::{ProcessingContext, ProcessingResult, ProcessingStatus};
pub use document::{Document, DocumentStatus, DocumentType, StageCompletionMarker, StageState, StageStatus};
pub use embedding::{SourceType, UnifiedEmbedding, EMBEDDING_DIM};
pub use media::{Image, ImageType, Link, Video, VideoMetadata};
pub use queue::{ProcessingQueueItem, QueueItemStatus, QueuePayload};
pub use stage::{Stage, ALL_STAGES};
