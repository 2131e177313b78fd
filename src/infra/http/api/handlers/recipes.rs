//! Recipe handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::access_tokens::Principal;
use crate::application::recipes::{CreateRecipeCommand, UpdateRecipeCommand};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

use super::uuid_path;

pub async fn list_recipes(
    State(state): State<ApiState>,
    query: Result<Query<RecipeListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let request = query.page_request(state.pagination)?;
    let filter = query.filter()?;

    let page = state.recipes.list(&filter, request).await?;
    let cdn = &state.cdn;
    Ok(Json(Envelope::page(
        page.map(|summary| public_summary(cdn, summary)),
        request,
    )))
}

pub async fn list_user_recipes(
    State(state): State<ApiState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = uuid_path(user_id)?;
    let Query(query) = query?;
    let request = query.resolve(state.pagination)?;

    let page = state.recipes.list_by_author(user_id, request).await?;
    let cdn = &state.cdn;
    Ok(Json(Envelope::page(
        page.map(|summary| public_summary(cdn, summary)),
        request,
    )))
}

pub async fn get_recipe(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.recipes.view_by_slug(&slug).await?;
    Ok(Json(Envelope::ok(public_detail(&state.cdn, detail))))
}

pub async fn create_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateRecipeCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(command) = payload?;
    let detail = state.recipes.create(principal.user_id, command).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(public_detail(&state.cdn, detail))),
    ))
}

pub async fn update_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateRecipeCommand>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    let Json(command) = payload?;
    let detail = state.recipes.update(principal.user_id, id, command).await?;
    Ok(Json(Envelope::ok(public_detail(&state.cdn, detail))))
}

pub async fn delete_recipe(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = uuid_path(id)?;
    state.recipes.delete(principal.user_id, id).await?;
    Ok(Json(Envelope::ok(MessageBody {
        message: "Recipe deleted successfully",
    })))
}
