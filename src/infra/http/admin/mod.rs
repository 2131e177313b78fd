//! Operator surface, bound to the admin listener only.

mod cache;
mod health;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/cache/purge", post(cache::purge_urls))
        .route("/admin/cache/purge-all", post(cache::purge_all))
        .route("/admin/cache/stats", get(cache::stats))
        .route("/admin/health", get(health::admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
