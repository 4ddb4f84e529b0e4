//! HTTP frontend for the synchronization service.
//!
//! JSON endpoints mirror the gRPC surface; the path-style endpoints keep
//! the plain-text protocol older tooling speaks. The batch endpoint
//! acknowledges with a single representative item, deterministic only by
//! list order.

use crate::app::SyncApp;
use crate::error::ServiceError;
use crate::logging;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use pulsemon_common::metric::{Metric, MetricKind, MetricQuery};
use std::sync::Arc;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.http_status(), self.to_string()).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<MetricKind, ServiceError> {
    raw.parse().map_err(|e: String| ServiceError::validation(e))
}

async fn update_json(
    State(app): State<Arc<SyncApp>>,
    Json(metric): Json<Metric>,
) -> Result<Json<Metric>, ServiceError> {
    let stored = app.update_single(metric)?;
    Ok(Json(stored))
}

async fn update_batch_json(
    State(app): State<Arc<SyncApp>>,
    Json(metrics): Json<Vec<Metric>>,
) -> Result<Response, ServiceError> {
    let mut listed = app.update_batch(metrics)?;
    // minimal acknowledgment: the first item of the post-update list
    let first = listed.drain(..).next();
    match first {
        Some(first) => Ok(Json(first).into_response()),
        None => Ok(StatusCode::OK.into_response()),
    }
}

async fn retrieve_json(
    State(app): State<Arc<SyncApp>>,
    Json(query): Json<MetricQuery>,
) -> Result<Json<Metric>, ServiceError> {
    let stored = app.retrieve(&query)?;
    Ok(Json(stored))
}

async fn update_path(
    State(app): State<Arc<SyncApp>>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<String, Response> {
    // unknown kinds on this legacy path answer 501, not 400, so clients
    // probing capabilities can tell "never supported" from "bad request"
    let kind: MetricKind = kind.parse().map_err(|e: String| {
        (StatusCode::NOT_IMPLEMENTED, e).into_response()
    })?;
    let metric = match kind {
        MetricKind::Counter => {
            let delta = value.parse::<i64>().map_err(|_| {
                ServiceError::validation(format!("could not parse int from {value}"))
                    .into_response()
            })?;
            Metric::counter(id, delta)
        }
        MetricKind::Gauge => {
            let reading = value.parse::<f64>().map_err(|_| {
                ServiceError::validation(format!("could not parse float from {value}"))
                    .into_response()
            })?;
            Metric::gauge(id, reading)
        }
    };
    app.update_single(metric)
        .map_err(IntoResponse::into_response)?;
    Ok("Status: OK".to_string())
}

async fn retrieve_path(
    State(app): State<Arc<SyncApp>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, ServiceError> {
    let kind = parse_kind(&kind)?;
    let stored = app.retrieve(&MetricQuery { id, kind })?;
    Ok(stored.value_string())
}

async fn list_all(State(app): State<Arc<SyncApp>>) -> Result<Json<Vec<Metric>>, ServiceError> {
    let listed = app.retrieve_all()?;
    Ok(Json(listed))
}

async fn ping(State(app): State<Arc<SyncApp>>) -> Result<StatusCode, ServiceError> {
    app.health_check()?;
    Ok(StatusCode::OK)
}

pub fn build_router(app: Arc<SyncApp>) -> Router {
    Router::new()
        .route("/", get(list_all))
        .route("/ping", get(ping))
        .route("/update", post(update_json))
        .route("/updates", post(update_batch_json))
        .route("/value", post(retrieve_json))
        .route("/update/:kind/:id/:value", post(update_path))
        .route("/value/:kind/:id", get(retrieve_path))
        .with_state(app)
        .layer(middleware::from_fn(logging::request_logging))
}
