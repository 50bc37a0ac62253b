//! `POST /process/stage/{stage_name}`, `POST /process/stages`, `GET /stages`,
//! `GET /stages/status`.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use krai_core::types::{Stage, ALL_STAGES};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct StageRunResponse {
    pub success: bool,
    pub stage: String,
    pub processing_time: f64,
    pub data: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/process/stage/{stage_name}",
    params(("id" = Uuid, Path), ("stage_name" = String, Path)),
    responses(
        (status = 200, description = "Stage ran", body = StageRunResponse),
        (status = 400, description = "Unknown stage"),
        (status = 404, description = "Document not found"),
    ),
    tag = "stages"
)]
pub async fn run_stage(
    State(state): State<AppState>,
    Path((id, stage_name)): Path<(Uuid, String)>,
) -> ApiResult<Json<StageRunResponse>> {
    let stage = Stage::parse_name_or_number(&stage_name)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown stage: {stage_name}")))?;
    let outcome = state.pipeline.run_single_stage(id, stage).await?;
    Ok(Json(StageRunResponse {
        success: outcome.success,
        stage: outcome.stage.name().to_string(),
        processing_time: outcome.processing_time_s,
        data: outcome.data,
        error: outcome.error,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RunStagesRequest {
    pub stages: Vec<String>,
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StagesRunResponse {
    pub total_stages: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f32,
    pub stage_results: Vec<StageRunResponse>,
}

#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/process/stages",
    params(("id" = Uuid, Path)),
    request_body = RunStagesRequest,
    responses(
        (status = 200, description = "Stages ran", body = StagesRunResponse),
        (status = 400, description = "One or more unknown stages"),
        (status = 404, description = "Document not found"),
    ),
    tag = "stages"
)]
pub async fn run_stages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RunStagesRequest>,
) -> ApiResult<Json<StagesRunResponse>> {
    let stages: Vec<Stage> = body
        .stages
        .iter()
        .map(|s| Stage::parse_name_or_number(s).ok_or_else(|| ApiError::BadRequest(format!("unknown stage: {s}"))))
        .collect::<ApiResult<_>>()?;

    let summary = state.pipeline.run_stages(id, &stages, body.stop_on_error).await?;
    Ok(Json(StagesRunResponse {
        total_stages: summary.total_stages,
        successful: summary.successful,
        failed: summary.failed,
        success_rate: summary.success_rate,
        stage_results: summary
            .stage_results
            .into_iter()
            .map(|outcome| StageRunResponse {
                success: outcome.success,
                stage: outcome.stage.name().to_string(),
                processing_time: outcome.processing_time_s,
                data: outcome.data,
                error: outcome.error,
            })
            .collect(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StageListEntry {
    pub number: u8,
    pub name: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}/stages",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "All 15 stages", body = [StageListEntry])),
    tag = "stages"
)]
pub async fn list_stages(Path(_id): Path<Uuid>) -> Json<Vec<StageListEntry>> {
    Json(ALL_STAGES.iter().map(|s| StageListEntry { number: s.number(), name: s.name() }).collect())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StageStatusResponse {
    pub document_id: Uuid,
    pub found: bool,
    pub stage_status: HashMap<String, String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}/stages/status",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Per-stage status", body = StageStatusResponse)),
    tag = "stages"
)]
pub async fn stage_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<StageStatusResponse>> {
    let report = state.pipeline.get_stage_status(id).await?;
    Ok(Json(StageStatusResponse {
        document_id: id,
        found: report.found,
        stage_status: report.stage_status.into_iter().map(|(stage, state)| (stage.name().to_string(), format!("{state:?}").to_lowercase())).collect(),
    }))
}
