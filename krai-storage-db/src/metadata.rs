//! `error_codes`: backs [`krai_core::classification::ErrorCodeSink`].

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::classification::ErrorCodeSink;
use krai_core::error::{Error, Result};
use krai_core::types::{ErrorCode, ExtractionMethod, Severity};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlErrorCodeSink {
    store: LibsqlStore,
}

impl LibsqlErrorCodeSink {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn severity_to_str(s: Severity) -> &'static str {
    match s {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn extraction_method_to_str(m: ExtractionMethod) -> &'static str {
    match m {
        ExtractionMethod::Regex => "regex",
        ExtractionMethod::Llm => "llm",
    }
}

#[async_trait]
impl ErrorCodeSink for LibsqlErrorCodeSink {
    async fn write_error_code(&self, code: ErrorCode) -> Result<Uuid> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO error_codes (id, document_id, chunk_id, code, description, solution, page_number,
                confidence, severity, extraction_method, requires_technician, requires_parts)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                code.id.to_string(),
                code.document_id.to_string(),
                code.chunk_id.map(|id| id.to_string()),
                code.code,
                code.description,
                code.solution,
                code.page_number,
                code.confidence,
                severity_to_str(code.severity),
                extraction_method_to_str(code.extraction_method),
                code.requires_technician,
                code.requires_parts,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "error_codes", code.id.to_string()))?;
        Ok(code.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_error_code_round_trips_the_id() {
        let store = LibsqlStore::in_memory().await.unwrap();
        store.initialize_schema().await.unwrap();
        let sink = LibsqlErrorCodeSink::new(store.clone());

        let code = ErrorCode {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            chunk_id: None,
            code: "E-52".to_string(),
            description: "fuser temperature error".to_string(),
            solution: Some("replace fuser unit".to_string()),
            page_number: 40,
            confidence: 0.95,
            severity: Severity::Critical,
            extraction_method: ExtractionMethod::Regex,
            requires_technician: true,
            requires_parts: true,
        };
        let returned_id = sink.write_error_code(code.clone()).await.unwrap();
        assert_eq!(returned_id, code.id);

        let conn = store.connection().unwrap();
        let mut rows = conn.query("SELECT severity FROM error_codes WHERE id = ?", libsql::params![code.id.to_string()]).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let severity: String = row.get(0).unwrap();
        assert_eq!(severity, "critical");
    }
}
