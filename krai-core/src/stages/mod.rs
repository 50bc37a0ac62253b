//! `Processor` wrappers over the pure services in [`crate::extraction`],
//! [`crate::chunker`], [`crate::media`] and [`crate::storage`], one module per
//! pipeline stage not already covered by [`crate::classification`] or
//! [`crate::embedding`].

mod chunk_preprocessing;
mod image_processing;
mod link_extraction;
mod storage;
mod svg_processing;
mod table_extraction;
mod text_extraction;
mod upload;
mod visual_embedding;

pub use chunk_preprocessing::ChunkPreprocessingProcessor;
pub use image_processing::ImageProcessingProcessor;
pub use link_extraction::LinkExtractionProcessor;
pub use storage::StorageProcessor;
pub use svg_processing::SvgProcessingProcessor;
pub use table_extraction::{TableExtractionProcessor, TableSink};
pub use text_extraction::TextExtractionProcessor;
pub use upload::UploadProcessor;
pub use visual_embedding::{NoopVisionModelClient, VisionModelClient, VisualEmbeddingProcessor};
