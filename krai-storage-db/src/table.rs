//! `structured_tables`: backs [`krai_core::stages::TableSink`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::stages::TableSink;
use krai_core::types::StructuredTable;

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlTableSink {
    store: LibsqlStore,
}

impl LibsqlTableSink {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TableSink for LibsqlTableSink {
    async fn write_table(&self, table: StructuredTable) -> Result<Uuid> {
        let conn = self.store.connection()?;
        let bbox = table.bbox.map(|b| serde_json::to_string(&b)).transpose().map_err(Error::Serialization)?;
        let rows = serde_json::to_string(&table.rows).map_err(Error::Serialization)?;

        conn.execute(
            "INSERT INTO structured_tables (id, document_id, page_number, markdown, rows, cols, bbox, context_text)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                table.id.to_string(),
                table.document_id.to_string(),
                table.page_number,
                table.markdown,
                rows,
                table.cols,
                bbox,
                table.context_text,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "structured_tables", table.id.to_string()))?;
        Ok(table.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> LibsqlTableSink {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        LibsqlTableSink::new(store)
    }

    #[tokio::test]
    async fn writes_a_structured_table_row() {
        let sink = fixture().await;
        let table = StructuredTable {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            page_number: 3,
            markdown: "| Part | Qty |\n|---|---|\n| Fuser | 1 |".to_string(),
            rows: vec![vec!["Part".to_string(), "Qty".to_string()], vec!["Fuser".to_string(), "1".to_string()]],
            cols: 2,
            bbox: None,
            context_text: None,
        };
        let id = table.id;
        assert_eq!(sink.write_table(table).await.unwrap(), id);
    }
}
