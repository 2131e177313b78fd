//! Like, favorite and comment handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::access_tokens::Principal;
use crate::application::interactions::CreateCommentCommand;
use crate::application::repos::Reaction;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

use super::uuid_path;

async fn react(
    state: ApiState,
    principal: Principal,
    recipe_id: Uuid,
    kind: Reaction,
) -> Result<(StatusCode, Json<Envelope<ReactionBody>>), ApiError> {
    state
        .interactions
        .react(kind, principal.user_id, recipe_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(ReactionBody {
            recipe_id,
            user_id: principal.user_id,
        })),
    ))
}

async fn unreact(
    state: ApiState,
    principal: Principal,
    recipe_id: Uuid,
    kind: Reaction,
    message: &'static str,
) -> Result<Json<Envelope<MessageBody>>, ApiError> {
    state
        .interactions
        .unreact(kind, principal.user_id, recipe_id)
        .await?;
    Ok(Json(Envelope::ok(MessageBody { message })))
}

pub async fn like_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    react(state, principal, uuid_path(id)?, Reaction::Like).await
}

pub async fn unlike_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    unreact(state, principal, id, Reaction::Like, "Recipe unliked successfully").await
}

pub async fn favorite_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    react(state, principal, uuid_path(id)?, Reaction::Favorite).await
}

pub async fn unfavorite_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    unreact(
        state,
        principal,
        id,
        Reaction::Favorite,
        "Recipe removed from favorites",
    )
    .await
}

pub async fn list_favorites(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let request = query.resolve(state.pagination)?;

    let page = state
        .interactions
        .favorites(principal.user_id, request)
        .await?;
    let cdn = &state.cdn;
    Ok(Json(Envelope::page(
        page.map(|summary| public_summary(cdn, summary)),
        request,
    )))
}

pub async fn create_comment(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateCommentCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let recipe_id = uuid_path(id)?;
    let Json(command) = payload?;
    let comment = state
        .interactions
        .comment(principal.user_id, recipe_id, command)
        .await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(comment))))
}

pub async fn list_comments(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let recipe_id = uuid_path(id)?;
    let Query(query) = query?;
    let request = query.resolve(state.pagination)?;

    let page = state.interactions.comments(recipe_id, request).await?;
    Ok(Json(Envelope::page(page, request)))
}

pub async fn delete_comment(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    state
        .interactions
        .delete_comment(principal.user_id, id)
        .await?;
    Ok(Json(Envelope::ok(MessageBody {
        message: "Comment deleted successfully",
    })))
}
