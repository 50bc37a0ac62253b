//! Image / SVG / Table Stages and the Context Extraction service
//! they all share.

pub mod context;
pub mod image;
pub mod svg;
pub mod table;

pub use context::{ContextExtractor, ImageContext, LinkContext, DEFAULT_CONTEXT_WINDOW};
pub use image::{infer_image_type, ImageStage, NoopRasterImageExtractor, RasterImage, RasterImageExtractor};
pub use svg::{
    NoopPdfRegionRenderer, NoopVectorGraphicsExtractor, PdfRegionRenderer, SvgExtractionMethod, SvgRasterizer,
    SvgResult, SvgStage, SvgStageConfig, UsvgRasterizer, VectorDrawing, VectorGraphicsExtractor,
};
pub use table::{ExtractedTable, NoopTableExtractor, TableExtractor, TableStage};
