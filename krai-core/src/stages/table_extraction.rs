//! Table Extraction (stage 8, spec numbering aside): cell-matrix table
//! extraction per page, rendered to markdown and persisted ahead of
//! embedding under `source_type = table`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::media::TableStage;
use crate::processor::Processor;
use crate::types::{ProcessingContext, ProcessingResult, Stage, StructuredTable};

/// Where extracted tables are durably written. Mirrors
/// [`crate::classification::ErrorCodeSink`]'s degrade-rather-than-fail
/// contract: with no sink wired the stage still populates `context.tables`
/// for downstream embedding, it just doesn't persist a `structured_tables` row.
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn write_table(&self, table: StructuredTable) -> Result<Uuid>;
}

const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

pub struct TableExtractionProcessor {
    stage: TableStage,
    sink: Option<Arc<dyn TableSink>>,
}

impl TableExtractionProcessor {
    #[must_use]
    pub fn new(stage: TableStage, sink: Option<Arc<dyn TableSink>>) -> Self {
        Self { stage, sink }
    }
}

#[async_trait]
impl Processor for TableExtractionProcessor {
    fn name(&self) -> &'static str {
        "table_extraction"
    }

    fn stage(&self) -> Stage {
        Stage::TableExtraction
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        &["file_path", "page_texts"]
    }

    fn output_tables(&self) -> &'static [&'static str] {
        &["structured_tables"]
    }

    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
        let raw_path = context
            .file_path
            .as_deref()
            .ok_or_else(|| Error::MissingInput("file_path".to_string()))?;
        let page_texts = context
            .page_texts
            .as_ref()
            .ok_or_else(|| Error::MissingInput("page_texts".to_string()))?;
        let pdf_path = std::path::Path::new(raw_path);
        let ordered: BTreeMap<u32, &String> = page_texts.iter().map(|(p, t)| (*p, t)).collect();

        let mut all_tables = Vec::new();
        let mut written = 0u64;

        for (page_number, page_text) in ordered {
            let tables = self.stage.process_page(context.document_id, pdf_path, page_number, page_text, DEFAULT_PAGE_HEIGHT)?;
            if let Some(sink) = &self.sink {
                for table in &tables {
                    if let Err(e) = sink.write_table(table.clone()).await {
                        tracing::warn!(error = %e, "failed to persist an extracted table");
                        continue;
                    }
                    written += 1;
                }
            }
            all_tables.extend(tables);
        }

        let found = all_tables.len() as u64;
        if self.sink.is_none() && found > 0 {
            tracing::warn!(found, "no table sink wired, extracted tables were not persisted");
        }
        context.tables = Some(all_tables);

        let mut data = HashMap::new();
        data.insert("tables_found".to_string(), serde_json::json!(found));
        data.insert("tables_written".to_string(), serde_json::json!(written));
        Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::context::ContextExtractor;
    use crate::media::table::{ExtractedTable, NoopTableExtractor, TableExtractor};
    use std::sync::Mutex;
    use uuid::Uuid as UuidT;

    struct OneTable;
    impl TableExtractor for OneTable {
        fn extract_page(&self, _path: &std::path::Path, page_number: u32) -> Result<Vec<ExtractedTable>> {
            Ok(vec![ExtractedTable {
                page_number,
                rows: vec![vec!["Part".to_string(), "Qty".to_string()], vec!["Fuser".to_string(), "1".to_string()]],
                bbox: None,
            }])
        }
    }

    struct RecordingSink(Mutex<Vec<StructuredTable>>);
    #[async_trait::async_trait]
    impl TableSink for RecordingSink {
        async fn write_table(&self, table: StructuredTable) -> Result<UuidT> {
            let id = table.id;
            self.0.lock().unwrap().push(table);
            Ok(id)
        }
    }

    #[tokio::test]
    async fn writes_through_the_sink_and_populates_context() {
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let processor = TableExtractionProcessor::new(
            TableStage::new(Arc::new(OneTable), ContextExtractor::default()),
            Some(sink.clone() as Arc<dyn TableSink>),
        );
        let mut ctx = ProcessingContext::new(UuidT::new_v4(), Stage::TableExtraction);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "page text".to_string());
        ctx.page_texts = Some(pages);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(ctx.tables.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn without_a_sink_tables_still_populate_context() {
        let processor = TableExtractionProcessor::new(TableStage::new(Arc::new(NoopTableExtractor), ContextExtractor::default()), None);
        let mut ctx = ProcessingContext::new(UuidT::new_v4(), Stage::TableExtraction);
        ctx.file_path = Some("/tmp/doc.pdf".to_string());
        let mut pages = HashMap::new();
        pages.insert(0u32, "text".to_string());
        ctx.page_texts = Some(pages);

        let result = processor.process(&mut ctx).await.unwrap();
        assert!(result.success);
        assert!(ctx.tables.unwrap().is_empty());
    }
}
