//! User profile handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::access_tokens::Principal;
use crate::application::users::UpdateProfileCommand;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

use super::uuid_path;

pub async fn get_user(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    let profile = state.users.profile(id).await?;
    Ok(Json(Envelope::ok(public_profile(&state.cdn, profile))))
}

pub async fn update_user(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateProfileCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    let Json(command) = payload?;
    let profile = state
        .users
        .update_profile(principal.user_id, id, command)
        .await?;
    Ok(Json(Envelope::ok(public_profile(&state.cdn, profile))))
}
