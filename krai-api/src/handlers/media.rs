//! `POST /process/video` and `POST /process/thumbnail`.
//!
//! Neither enrichment has a concrete backend wired yet — no Brightcove
//! client and no PDF-page rasterizer exist in `krai-core` today — so both
//! handlers validate their input and then report `503`, the same response
//! the spec names for "service unconfigured".

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessVideoRequest {
    pub video_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessVideoResponse {
    pub success: bool,
    pub video_url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/process/video",
    params(("id" = Uuid, Path)),
    request_body = ProcessVideoRequest,
    responses(
        (status = 200, description = "Video enriched", body = ProcessVideoResponse),
        (status = 422, description = "Invalid video URL"),
        (status = 503, description = "Video enrichment service not configured"),
    ),
    tag = "media"
)]
pub async fn process_video(
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
    Json(body): Json<ProcessVideoRequest>,
) -> ApiResult<Json<ProcessVideoResponse>> {
    url::Url::parse(&body.video_url).map_err(|e| ApiError::Unprocessable(format!("invalid video_url: {e}")))?;

    if !state.config.enable_brightcove_enrichment {
        return Err(ApiError::ServiceUnavailable("video enrichment is disabled (ENABLE_BRIGHTCOVE_ENRICHMENT=0)".to_string()));
    }
    Err(ApiError::ServiceUnavailable("no video enrichment backend is configured".to_string()))
}

#[derive(Debug, Deserialize, ToSchema, Default)]
pub struct ProcessThumbnailRequest {
    pub size: Option<(u32, u32)>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessThumbnailResponse {
    pub success: bool,
    pub thumbnail_url: String,
    pub size: (u32, u32),
    pub file_size: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/documents/{id}/process/thumbnail",
    params(("id" = Uuid, Path)),
    request_body = ProcessThumbnailRequest,
    responses(
        (status = 200, description = "Thumbnail generated", body = ProcessThumbnailResponse),
        (status = 400, description = "Document has no stored file path"),
        (status = 503, description = "Thumbnail rendering not configured"),
    ),
    tag = "media"
)]
pub async fn process_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(_body): Json<ProcessThumbnailRequest>,
) -> ApiResult<Json<ProcessThumbnailResponse>> {
    let context = state.pipeline.load_context(id).await?;
    if context.file_path.is_none() {
        return Err(ApiError::BadRequest("document has no stored file path".to_string()));
    }
    Err(ApiError::ServiceUnavailable("no PDF-page thumbnail renderer is configured".to_string()))
}
