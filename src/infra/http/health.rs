//! Liveness and readiness endpoints on the public listener.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use crate::application::error::ErrorReport;

use super::ReadinessCheck;

#[derive(Clone)]
pub struct HealthState {
    pub readiness: Arc<dyn ReadinessCheck>,
    pub started_at: Instant,
}

impl HealthState {
    pub fn new(readiness: Arc<dyn ReadinessCheck>) -> Self {
        Self {
            readiness,
            started_at: Instant::now(),
        }
    }
}

pub(crate) fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub(super) async fn health(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": timestamp(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

pub(super) async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive", "timestamp": timestamp() }))
}

pub(super) async fn ready(State(state): State<HealthState>) -> Response {
    match state.readiness.ready().await {
        Ok(()) => Json(json!({ "status": "ready", "timestamp": timestamp() })).into_response(),
        Err(reason) => {
            warn!(target = "sabor::http::health", reason = %reason, "readiness check failed");
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "timestamp": timestamp() })),
            )
                .into_response();
            ErrorReport::from_message(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                reason,
            )
            .attach(&mut response);
            response
        }
    }
}
