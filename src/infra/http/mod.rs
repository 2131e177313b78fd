mod admin;
pub mod api;
mod health;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use api::rate_limit::ApiRateLimiter;
pub use api::{ApiState, build_api_router};
pub use health::HealthState;
pub use middleware::RequestContext;
pub use public::build_public_router;

use async_trait::async_trait;

/// Dependency checked by `GET /ready`.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn ready(&self) -> Result<(), String>;
}
