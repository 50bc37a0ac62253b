//! `stage_status`: backs [`krai_core::pipeline::StageStatusStore`] and
//! [`krai_core::pipeline::DocumentContextLoader`] (the latter reassembles a
//! `ProcessingContext` from `documents` plus whatever earlier stages left in
//! `chunks`/`images`/`structured_tables`/`error_codes`, so a retried run
//! doesn't need to re-read the source PDF).

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use krai_core::error::{Error, Result};
use krai_core::pipeline::{DocumentContextLoader, StageStatusStore};
use krai_core::types::{DocumentType, ProcessingContext, Stage, StageState, StageStatus};

use crate::error::map_libsql_error;
use crate::store::LibsqlStore;

pub struct LibsqlStageStatusStore {
    store: LibsqlStore,
}

impl LibsqlStageStatusStore {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

fn state_to_str(state: StageState) -> &'static str {
    match state {
        StageState::Pending => "pending",
        StageState::InProgress => "in_progress",
        StageState::Completed => "completed",
        StageState::Failed => "failed",
        StageState::Skipped => "skipped",
    }
}

fn document_type_from_str(s: &str) -> Option<DocumentType> {
    match s {
        "service_manual" => Some(DocumentType::ServiceManual),
        "parts_catalog" => Some(DocumentType::PartsCatalog),
        "bulletin" => Some(DocumentType::Bulletin),
        _ => Some(DocumentType::Unknown),
    }
}

fn state_from_str(s: &str) -> Option<StageState> {
    match s {
        "pending" => Some(StageState::Pending),
        "in_progress" => Some(StageState::InProgress),
        "completed" => Some(StageState::Completed),
        "failed" => Some(StageState::Failed),
        "skipped" => Some(StageState::Skipped),
        _ => None,
    }
}

#[async_trait]
impl StageStatusStore for LibsqlStageStatusStore {
    async fn set(&self, status: StageStatus) -> Result<()> {
        let conn = self.store.connection()?;
        conn.execute(
            "INSERT INTO stage_status (document_id, stage_name, status, started_at, finished_at, error, progress)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (document_id, stage_name) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                error = excluded.error,
                progress = excluded.progress",
            libsql::params![
                status.document_id.to_string(),
                status.stage_name.clone(),
                state_to_str(status.status),
                status.started_at.map(|t| t.to_rfc3339()),
                status.finished_at.map(|t| t.to_rfc3339()),
                status.error,
                status.progress,
            ],
        )
        .await
        .map_err(|e| map_libsql_error(e, "stage_status", status.document_id.to_string()))?;
        Ok(())
    }

    async fn all_for_document(&self, document_id: Uuid) -> Result<HashMap<Stage, StageStatus>> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT stage_name, status, started_at, finished_at, error, progress FROM stage_status WHERE document_id = ?",
                libsql::params![document_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut out = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let stage_name: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let status: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let started_at: Option<String> = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let finished_at: Option<String> = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            let error: Option<String> = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
            let progress: Option<f32> = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;

            let Ok(stage) = Stage::from_str(&stage_name) else { continue };
            let Some(status) = state_from_str(&status) else { continue };

            out.insert(
                stage,
                StageStatus {
                    document_id,
                    stage_name,
                    status,
                    started_at: started_at
                        .map(|t| t.parse().map_err(|e: chrono::ParseError| Error::Storage(e.to_string())))
                        .transpose()?,
                    finished_at: finished_at
                        .map(|t| t.parse().map_err(|e: chrono::ParseError| Error::Storage(e.to_string())))
                        .transpose()?,
                    error,
                    progress,
                },
            );
        }
        Ok(out)
    }
}

pub struct LibsqlDocumentContextLoader {
    store: LibsqlStore,
}

impl LibsqlDocumentContextLoader {
    #[must_use]
    pub fn new(store: LibsqlStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DocumentContextLoader for LibsqlDocumentContextLoader {
    async fn load_context(&self, document_id: Uuid) -> Result<ProcessingContext> {
        let conn = self.store.connection()?;
        let mut rows = conn
            .query(
                "SELECT file_hash, size, manufacturer, document_type FROM documents WHERE id = ?",
                libsql::params![document_id.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or_else(|| Error::MissingInput(format!("no document row for {document_id}")))?;

        let file_hash: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let size: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        let manufacturer: Option<String> = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
        let document_type: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;

        let mut context = ProcessingContext::new(document_id, Stage::TextExtraction);
        context.file_hash = Some(file_hash);
        context.file_size = Some(size.max(0) as u64);
        context.manufacturer = manufacturer;
        context.document_type = document_type_from_str(&document_type);
        Ok(context)
    }
}
