//! Table stage: cell-matrix table extraction, markdown rendering, and
//! persistence ahead of later embedding under `source_type = table`.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::media::context::ContextExtractor;
use crate::types::{BoundingBox, StructuredTable};

/// A raw cell matrix pulled off a page, prior to markdown rendering.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub page_number: u32,
    pub rows: Vec<Vec<String>>,
    pub bbox: Option<BoundingBox>,
}

/// Backend capable of pulling tables off a PDF page.
pub trait TableExtractor: Send + Sync {
    fn extract_page(&self, path: &Path, page_number: u32) -> Result<Vec<ExtractedTable>>;
}

/// Used when no table-capable backend is wired: every page yields zero
/// tables.
pub struct NoopTableExtractor;

impl TableExtractor for NoopTableExtractor {
    fn extract_page(&self, _path: &Path, _page_number: u32) -> Result<Vec<ExtractedTable>> {
        Ok(Vec::new())
    }
}

pub struct TableStage {
    extractor: Arc<dyn TableExtractor>,
    context: ContextExtractor,
}

impl TableStage {
    #[must_use]
    pub fn new(extractor: Arc<dyn TableExtractor>, context: ContextExtractor) -> Self {
        Self { extractor, context }
    }

    /// Extract every table on `page_number`, rendering each as both a cell
    /// matrix and markdown so it can be embedded as text and displayed
    /// as-is. Re-running on the same document is safe: callers persist
    /// `StructuredTable` rows behind the completion marker for this stage.
    pub fn process_page(
        &self,
        document_id: Uuid,
        pdf_path: &Path,
        page_number: u32,
        page_text: &str,
        page_height: f64,
    ) -> Result<Vec<StructuredTable>> {
        let tables = self.extractor.extract_page(pdf_path, page_number)?;

        Ok(tables
            .into_iter()
            .map(|table| {
                let ctx = self.context.extract_image_context(page_text, table.bbox, page_height);
                let cols = table.rows.first().map_or(0, Vec::len) as u32;
                StructuredTable {
                    id: Uuid::new_v4(),
                    document_id,
                    page_number: table.page_number,
                    markdown: render_markdown(&table.rows),
                    rows: table.rows,
                    cols,
                    bbox: table.bbox,
                    context_text: ctx.context_caption,
                }
            })
            .collect())
    }
}

/// Render a cell matrix as a GitHub-flavored markdown table. The first row
/// is treated as the header.
#[must_use]
pub fn render_markdown(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first() else {
        return String::new();
    };

    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&header.join(" | "));
    out.push_str(" |\n|");
    for _ in header {
        out.push_str(" --- |");
    }
    out.push('\n');

    for row in &rows[1..] {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_rendering_has_header_separator_and_rows() {
        let rows = vec![
            vec!["Part".to_string(), "Qty".to_string()],
            vec!["Fuser unit".to_string(), "1".to_string()],
        ];
        let md = render_markdown(&rows);
        assert_eq!(md, "| Part | Qty |\n| --- | --- |\n| Fuser unit | 1 |\n");
    }

    #[test]
    fn empty_matrix_renders_to_empty_string() {
        assert_eq!(render_markdown(&[]), "");
    }
}
