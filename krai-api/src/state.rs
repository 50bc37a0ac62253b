//! Shared application state handed to every handler via axum's `State` extractor.

use std::sync::Arc;

use krai_core::config::EngineConfig;
use krai_core::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<EngineConfig>,
}
