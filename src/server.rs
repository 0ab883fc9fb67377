use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{
    backend::{InferenceBackend, RemoteCall},
    config::RelayConfig,
    error::RelayError,
    normalize::RemotePayload,
    proxy, routes,
};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub backend: Arc<dyn InferenceBackend>,
    /// Client used by the media proxy.
    pub http: reqwest::Client,
}

/// Result of one remote call together with its wall-clock duration.
pub struct TimedPayload {
    pub payload: RemotePayload,
    pub duration: Duration,
}

impl AppState {
    pub fn new(config: RelayConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            http: reqwest::Client::new(),
        }
    }

    /// Runs a remote call and measures how long it took.
    pub async fn invoke(&self, call: RemoteCall) -> Result<TimedPayload, RelayError> {
        let operation = call.operation;
        log::info!(
            "Calling {} on {}",
            operation.endpoint(),
            self.backend.endpoint_url()
        );

        let start_time = Instant::now();
        let payload = self.backend.predict(call).await?;
        let duration = start_time.elapsed();

        log::info!("{} completed in {:.2?}", operation.endpoint(), duration);
        Ok(TimedPayload { payload, duration })
    }
}

/// Builds the relay's HTTP surface.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .route("/analyze/text", post(routes::analyze_text))
        .route("/analyze/box", post(routes::analyze_box))
        .route("/analyze/tracker", post(routes::analyze_tracker))
        .route("/analyze/video", post(routes::analyze_video))
        .route("/proxy-image", get(proxy::proxy_media))
        .route("/info", get(routes::info));

    if let Some(dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app = app.layer(DefaultBodyLimit::max(config.body_limit));
    if config.permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}
