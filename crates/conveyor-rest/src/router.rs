//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller},
    middleware::logging_middleware,
    state::AppState,
};
use axum::{
    extract::State,
    http::{HeaderName, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use conveyor_config::ServerConfig;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Creates the main application router.
///
/// `metrics_path` is only routed when the state carries a Prometheus handle.
pub fn create_router(state: AppState, server_config: &ServerConfig, metrics_path: &str) -> Router {
    let cors = create_cors_layer(server_config);
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let mut router = Router::new()
        .merge(health_controller::router())
        .merge(jobs_controller::router())
        .route("/", get(root));

    if state.metrics.is_some() {
        router = router.route(metrics_path, get(render_metrics));
    }

    let router = router
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid));

    info!("Router created with job administration endpoints");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if server_config.cors_enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "Conveyor job queue API"
}

/// Prometheus scrape endpoint.
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
