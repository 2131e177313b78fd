use axum::{
    Router,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use super::{
    api::{ApiState, build_api_router, error::ApiError},
    health::{self, HealthState},
    middleware::{log_responses, set_request_context},
};

/// Everything served on the public listener: the JSON API plus health endpoints.
pub fn build_public_router(api: ApiState, health: HealthState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/live", get(health::live))
        .route("/ready", get(health::ready))
        .with_state(health);

    build_api_router(api)
        .merge(health_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn not_found() -> Response {
    ApiError::not_found("Route not found").into_response()
}
