//! Classification, Metadata Extraction, Parts Extraction and Series
//! Detection (stages 9-12): the four processors that turn raw chunk
//! text into the manufacturer/product/series/error-code/part relational
//! graph.

mod catalog_store;
#[allow(clippy::module_inception)]
mod classification;
mod metadata;
mod parts;
mod series;

pub use catalog_store::CatalogStore;
pub use classification::{
    ClassificationLlm, ClassificationOutput, ClassificationProcessor, NoopProductDiscovery, ProductDiscovery,
    CLASSIFICATION_SAMPLE_PAGES, DEGRADED_MANUFACTURER,
};
pub use metadata::{extract_from_chunk, ErrorCodeSink, MetadataExtractionProcessor, REGEX_MATCH_CONFIDENCE};
pub use parts::{classify_category, PartsExtractionProcessor};
pub use series::SeriesDetectionProcessor;
