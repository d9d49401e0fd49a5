use std::sync::Arc;

use appointflow_agent::{GraphExecutor, RunCoordinator};
use appointflow_core::config::AppConfig;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: AppConfig,
    /// Pause-mode executor; every engine call runs on a blocking thread.
    pub executor: Arc<GraphExecutor>,
    pub coordinator: Arc<RunCoordinator>,
    /// Copied into `meta.model_provider` of each new run.
    pub model_provider: String,
}
