//! Registration, login and token lifecycle handlers

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::access_tokens::Principal;
use crate::application::auth::{LoginCommand, RegisterCommand};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(command) = payload?;
    let session = state.auth.register(command).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(public_session(&state.cdn, session))),
    ))
}

pub async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<LoginCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(command) = payload?;
    let session = state.auth.login(command).await?;
    Ok(Json(Envelope::ok(public_session(&state.cdn, session))))
}

pub async fn refresh(
    State(state): State<ApiState>,
    payload: Result<Json<RefreshTokenBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let tokens = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(Envelope::ok(tokens)))
}

pub async fn logout(
    State(state): State<ApiState>,
    payload: Result<Json<RefreshTokenBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    state.auth.logout(&body.refresh_token).await?;
    Ok(Json(Envelope::ok(MessageBody {
        message: "Logged out successfully",
    })))
}

pub async fn me(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.auth.me(principal.user_id).await?;
    Ok(Json(Envelope::ok(public_account(&state.cdn, account))))
}
