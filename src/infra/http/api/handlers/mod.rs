//! API handlers organized by resource.

mod auth;
mod interactions;
mod recipes;
mod uploads;
mod users;

pub use auth::*;
pub use interactions::*;
pub use recipes::*;
pub use uploads::*;
pub use users::*;

use axum::extract::Path;
use axum::extract::rejection::PathRejection;
use uuid::Uuid;

use super::error::ApiError;

pub(crate) fn uuid_path(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    let Path(id) = path?;
    Ok(id)
}
