use axum::{Json, extract::State};
use serde_json::{Value, json};

use super::super::health::timestamp;
use super::AdminState;

/// Which external integrations are wired up, and whether the KV store answers.
pub(super) async fn admin_health(State(state): State<AdminState>) -> Json<Value> {
    let kv = state.trigger.kv();
    let reachable = kv.is_reachable().await;

    Json(json!({
        "kv": {
            "configured": kv.backend() != "memory",
            "backend": kv.backend(),
            "reachable": reachable,
        },
        "storage": {
            "configured": state.storage.is_configured(),
            "origin": state.storage.origin_base(),
        },
        "cdn": { "configured": state.trigger.cdn().is_configured() },
        "timestamp": timestamp(),
    }))
}
