use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::application::error::ErrorReport;
use crate::cache::PurgeReport;
use crate::infra::cdn::DEFAULT_ANALYTICS_SINCE;

use super::super::health::timestamp;
use super::AdminState;

const SOURCE: &str = "infra::http::admin::cache";

fn bad_request(message: &'static str) -> Response {
    let mut response = (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
    ErrorReport::from_message(SOURCE, StatusCode::BAD_REQUEST, message).attach(&mut response);
    response
}

/// `{ "urls": [..] }` with every element a string.
fn parse_urls(body: &[u8]) -> Option<Vec<String>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("urls")?
        .as_array()?
        .iter()
        .map(|url| url.as_str().map(str::to_string))
        .collect()
}

fn report_response(message: &'static str, report: PurgeReport, urls: Option<usize>) -> Response {
    let status = if report.any_succeeded() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let message = if status.is_success() {
        message
    } else {
        "Cache purge failed"
    };
    let mut body = json!({
        "message": message,
        "kv": report.kv.is_purged(),
        "kv_outcome": report.kv,
        "kv_deleted": report.kv_deleted,
        "cdn": report.cdn,
    });
    if let (Some(count), Some(object)) = (urls, body.as_object_mut()) {
        object.insert("urls".to_string(), json!(count));
    }

    let mut response = (status, Json(body)).into_response();
    if !status.is_success() {
        ErrorReport::from_message(SOURCE, status, format!("no cache tier purged: {report:?}"))
            .attach(&mut response);
    }
    response
}

pub(super) async fn purge_urls(State(state): State<AdminState>, body: Bytes) -> Response {
    let Some(urls) = parse_urls(&body) else {
        return bad_request("URLs array is required");
    };

    let report = state.trigger.purge_urls(&urls).await;
    report_response("Cache purged successfully", report, Some(urls.len()))
}

pub(super) async fn purge_all(State(state): State<AdminState>) -> Response {
    let report = state.trigger.purge_everything().await;
    report_response("All cache purged successfully", report, None)
}

pub(super) async fn stats(State(state): State<AdminState>) -> Json<Value> {
    let analytics = state.trigger.cdn().analytics(DEFAULT_ANALYTICS_SINCE).await;
    Json(json!({
        "cdn": analytics,
        "timestamp": timestamp(),
    }))
}
