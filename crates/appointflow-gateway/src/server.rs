use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use appointflow_agent::{GraphExecutor, RunCoordinator};
use appointflow_core::config::AppConfig;

use crate::routes;
use crate::state::AppState;

/// JSON gateway driving paused runs through the coordinator.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    /// `executor` must be built in pause mode.
    pub fn new(
        config: AppConfig,
        executor: Arc<GraphExecutor>,
        coordinator: Arc<RunCoordinator>,
        model_provider: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                config,
                executor,
                coordinator,
                model_provider: model_provider.into(),
            }),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(routes::health))
            .route("/api/runs", post(routes::create_run))
            .route("/api/runs/{id}", get(routes::get_run))
            .route("/api/runs/{id}/confirm", post(routes::confirm))
            .route("/api/runs/{id}/slot", post(routes::slot))
            .route("/api/runs/{id}/review", post(routes::review))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let bind = &self.state.config.gateway.bind;
        let listener = TcpListener::bind(bind).await?;
        info!(bind = %bind, "Gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
