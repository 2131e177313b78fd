//! Image upload handler

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use serde_json::Value;

use crate::application::uploads::{UploadCommand, UploadError, UploadFolder};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

const FILE_FIELDS: [&str; 2] = ["image", "file"];
const DEFAULT_FILENAME: &str = "upload";

/// Multipart form with one image part (`image` or `file`) and an optional
/// `folder` text part.
pub async fn upload_image(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    if !state.uploads.is_configured() {
        return Err(UploadError::NotConfigured.into());
    }

    let mut folder = UploadFolder::default();
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(&state, err))?
    {
        match field.name() {
            Some("folder") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(&state, err))?;
                folder = UploadFolder::parse(&value)?;
            }
            Some(name) if FILE_FIELDS.contains(&name) && file.is_none() => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(&state, err))?;
                file = Some((filename, content_type, data));
            }
            _ => continue,
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| ApiError::validation("No file uploaded"))?;
    let stored = state
        .uploads
        .upload(UploadCommand {
            folder,
            filename,
            content_type,
            data,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(public_object(&state.cdn, stored))),
    ))
}

fn multipart_error(state: &ApiState, err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(state.uploads.max_bytes());
    }
    ApiError::bad_request("Invalid multipart payload").with_details(Value::String(err.body_text()))
}
