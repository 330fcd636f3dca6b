//! Shared helpers for HTTP integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use conveyor_config::ServerConfig;
use conveyor_jobs::{JobQueue, MemoryJobStore};
use conveyor_rest::{create_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// A queue over a fresh in-memory store.
pub fn test_queue() -> Arc<JobQueue> {
    Arc::new(JobQueue::new(Arc::new(MemoryJobStore::new())))
}

/// Build the router the server would build, around `state`.
pub fn build_app(state: AppState) -> Router {
    create_router(state, &ServerConfig::default(), "/metrics")
}

/// Router plus the queue behind it, for tests that seed or inspect state.
pub fn test_app() -> (Router, Arc<JobQueue>) {
    let queue = test_queue();
    (build_app(AppState::new(queue.clone())), queue)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.into()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
