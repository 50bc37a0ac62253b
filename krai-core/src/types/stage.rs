//! The fixed 15-stage pipeline enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the 15 named, numbered steps of the document pipeline.
///
/// The engine keys all durable state (completion markers, stage status,
/// advisory locks) by [`Stage::name`], not by the discriminant — the number
/// is surfaced only at the CLI/API boundary for operator convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Upload,
    TextExtraction,
    TableExtraction,
    SvgProcessing,
    ImageProcessing,
    VisualEmbedding,
    LinkExtraction,
    ChunkPreprocessing,
    Classification,
    MetadataExtraction,
    PartsExtraction,
    SeriesDetection,
    Storage,
    Embedding,
    SearchIndexing,
}

/// Declared pipeline order, also the order [`crate::pipeline::Pipeline::run_all_pending`]
/// and smart-resume iterate in.
pub const ALL_STAGES: [Stage; 15] = [
    Stage::Upload,
    Stage::TextExtraction,
    Stage::TableExtraction,
    Stage::SvgProcessing,
    Stage::ImageProcessing,
    Stage::VisualEmbedding,
    Stage::LinkExtraction,
    Stage::ChunkPreprocessing,
    Stage::Classification,
    Stage::MetadataExtraction,
    Stage::PartsExtraction,
    Stage::SeriesDetection,
    Stage::Storage,
    Stage::Embedding,
    Stage::SearchIndexing,
];

impl Stage {
    /// The durable, stable name the engine keys state by.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::TextExtraction => "text_extraction",
            Stage::TableExtraction => "table_extraction",
            Stage::SvgProcessing => "svg_processing",
            Stage::ImageProcessing => "image_processing",
            Stage::VisualEmbedding => "visual_embedding",
            Stage::LinkExtraction => "link_extraction",
            Stage::ChunkPreprocessing => "chunk_preprocessing",
            Stage::Classification => "classification",
            Stage::MetadataExtraction => "metadata_extraction",
            Stage::PartsExtraction => "parts_extraction",
            Stage::SeriesDetection => "series_detection",
            Stage::Storage => "storage",
            Stage::Embedding => "embedding",
            Stage::SearchIndexing => "search_indexing",
        }
    }

    /// The 1-based operator-facing number.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Stage::Upload => 1,
            Stage::TextExtraction => 2,
            Stage::TableExtraction => 3,
            Stage::SvgProcessing => 4,
            Stage::ImageProcessing => 5,
            Stage::VisualEmbedding => 6,
            Stage::LinkExtraction => 7,
            Stage::ChunkPreprocessing => 8,
            Stage::Classification => 9,
            Stage::MetadataExtraction => 10,
            Stage::PartsExtraction => 11,
            Stage::SeriesDetection => 12,
            Stage::Storage => 13,
            Stage::Embedding => 14,
            Stage::SearchIndexing => 15,
        }
    }

    /// Stages that must already be `completed` before this stage may run
    /// (e.g. `series_detection` requires `classification` and
    /// `metadata_extraction`).
    #[must_use]
    pub fn dependencies(self) -> &'static [Stage] {
        match self {
            Stage::Upload => &[],
            Stage::TextExtraction => &[Stage::Upload],
            Stage::TableExtraction | Stage::SvgProcessing | Stage::ImageProcessing => {
                &[Stage::TextExtraction]
            }
            Stage::VisualEmbedding => &[Stage::SvgProcessing, Stage::ImageProcessing],
            Stage::LinkExtraction => &[Stage::TextExtraction],
            Stage::ChunkPreprocessing => &[Stage::TextExtraction],
            Stage::Classification => &[Stage::ChunkPreprocessing],
            Stage::MetadataExtraction => &[Stage::ChunkPreprocessing],
            Stage::PartsExtraction => &[Stage::MetadataExtraction],
            Stage::SeriesDetection => &[Stage::Classification, Stage::MetadataExtraction],
            Stage::Storage => &[
                Stage::SvgProcessing,
                Stage::ImageProcessing,
                Stage::LinkExtraction,
            ],
            Stage::Embedding => &[Stage::ChunkPreprocessing, Stage::Storage],
            Stage::SearchIndexing => &[Stage::Embedding],
        }
    }

    /// Parse from either the stable name or the 1-based number, as accepted
    /// by the CLI's `--stage` flag.
    #[must_use]
    pub fn parse_name_or_number(s: &str) -> Option<Stage> {
        if let Ok(n) = s.parse::<u8>() {
            return ALL_STAGES.iter().copied().find(|st| st.number() == n);
        }
        s.parse().ok()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STAGES
            .iter()
            .copied()
            .find(|st| st.name() == s)
            .ok_or_else(|| crate::error::Error::InvalidInput(format!("unknown stage: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_name() {
        for stage in ALL_STAGES {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn parses_number() {
        assert_eq!(Stage::parse_name_or_number("1"), Some(Stage::Upload));
        assert_eq!(
            Stage::parse_name_or_number("15"),
            Some(Stage::SearchIndexing)
        );
        assert_eq!(
            Stage::parse_name_or_number("embedding"),
            Some(Stage::Embedding)
        );
        assert_eq!(Stage::parse_name_or_number("bogus"), None);
    }

    #[test]
    fn series_detection_depends_on_classification_and_metadata() {
        let deps = Stage::SeriesDetection.dependencies();
        assert!(deps.contains(&Stage::Classification));
        assert!(deps.contains(&Stage::MetadataExtraction));
    }
}
