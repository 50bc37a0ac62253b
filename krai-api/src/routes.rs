//! Router assembly: every document-scoped endpoint nests under
//! `/api/v1/documents/{id}`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{media, stages};
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    let document_routes = Router::new()
        .route("/process/stage/{stage_name}", post(stages::run_stage))
        .route("/process/stages", post(stages::run_stages))
        .route("/stages", get(stages::list_stages))
        .route("/stages/status", get(stages::stage_status))
        .route("/process/video", post(media::process_video))
        .route("/process/thumbnail", post(media::process_thumbnail));

    Router::new().nest("/api/v1/documents/{id}", document_routes)
}
