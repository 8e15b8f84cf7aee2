use crate::collectors::Collector;
use crate::config::{CorsConfig, StreamConfig};
use crate::metrics::Metrics;
use crate::snapshot::Snapshot;
use crate::stream::ws_handler;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct HttpAppState {
    pub collector: Arc<Collector>,
    pub metrics: Arc<Metrics>,
    pub stream: Arc<StreamConfig>,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub fn build_router(state: HttpAppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(snapshot_handler))
        .route("/metrics/prometheus", get(prometheus_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `["*"]` opens every origin, method and header; anything else is an explicit origin list.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let origins = if cfg.allows_any_origin() {
        AllowOrigin::from(Any)
    } else {
        let list: Vec<HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthStatus { status: "ok" }))
}

async fn snapshot_handler(State(state): State<HttpAppState>) -> Json<Snapshot> {
    Json(state.collector.snapshot())
}

async fn prometheus_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    let snapshot = state.collector.snapshot();
    match state.metrics.render_snapshot(&snapshot) {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}
