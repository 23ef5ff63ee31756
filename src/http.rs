use crate::collectors::host::{Clock, CommandRunner, Resolver};
use crate::collectors::Collector;
use crate::metrics::Metrics;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::any, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::error;

pub struct HttpAppState<R, D, C> {
    pub metrics: Arc<Metrics>,
    pub collector: Arc<Collector<R, D, C>>,
}

impl<R, D, C> Clone for HttpAppState<R, D, C> {
    fn clone(&self) -> Self {
        Self {
            metrics: self.metrics.clone(),
            collector: self.collector.clone(),
        }
    }
}

/// Every route answers any method the same way; admin paths are expected
/// to be gated by the front proxy.
pub fn build_router<R, D, C>(metrics: Arc<Metrics>, collector: Arc<Collector<R, D, C>>) -> Router
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    Router::new()
        .route("/public", any(public_handler::<R, D, C>))
        .route("/admin/health", any(admin_health_handler::<R, D, C>))
        .route("/admin/security", any(security_handler::<R, D, C>))
        .route("/admin/security/tasks", any(security_tasks_handler::<R, D, C>))
        .route("/healthz", any(healthz))
        .route("/metrics", any(metrics_handler::<R, D, C>))
        .with_state(HttpAppState { metrics, collector })
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn public_handler<R, D, C>(State(state): State<HttpAppState<R, D, C>>) -> Response
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    let collector = state.collector.clone();
    detached(async move { collector.public().await }).await
}

async fn admin_health_handler<R, D, C>(State(state): State<HttpAppState<R, D, C>>) -> Response
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    let collector = state.collector.clone();
    detached(async move { collector.admin_health().await }).await
}

async fn security_handler<R, D, C>(State(state): State<HttpAppState<R, D, C>>) -> Response
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    let collector = state.collector.clone();
    detached(async move { collector.security().await }).await
}

async fn security_tasks_handler<R, D, C>(State(state): State<HttpAppState<R, D, C>>) -> Response
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    let collector = state.collector.clone();
    detached(async move { collector.security_tasks().await }).await
}

/// Runs a collector call in its own task so a client that hangs up mid-refresh
/// does not cancel the refresh; the result still lands in the cache.
async fn detached<T, F>(fut: F) -> Response
where
    F: Future<Output = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            error!(error = %err, "задача сборки снимка завершилась с ошибкой");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "degraded", "error": "snapshot task failed" })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler<R, D, C>(State(state): State<HttpAppState<R, D, C>>) -> Response
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
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
