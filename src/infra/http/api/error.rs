use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::application::access_tokens::{AccessTokenError, AuthError};
use crate::application::auth::AuthServiceError;
use crate::application::error::ErrorReport;
use crate::application::interactions::InteractionError;
use crate::application::pagination::PaginationError;
use crate::application::recipes::RecipeError;
use crate::application::repos::RepoError;
use crate::application::uploads::UploadError;
use crate::application::users::UserError;
use crate::domain::error::DomainError;

pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const TOKEN_REVOKED: &str = "TOKEN_REVOKED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const STORAGE: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL_ERROR";
    pub const DB_TIMEOUT: &str = "DATABASE_TIMEOUT";
    pub const DATABASE: &str = "DATABASE_ERROR";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: ApiErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    /// Internal diagnostic; logged, never rendered.
    cause: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Authentication required",
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, codes::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, codes::CONFLICT, message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            format!("File exceeds the {} MB upload limit", limit.div_ceil(1024 * 1024)),
        )
        .with_details(serde_json::json!({ "max_bytes": limit }))
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let mut response = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "Too many requests, try again later",
        )
        .with_details(serde_json::json!({ "retry_after_seconds": retry_after }))
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = match self.cause.as_deref() {
            Some(cause) => format!("{}: {} ({cause})", self.code, self.message),
            None => format!("{}: {}", self.code, self.message),
        };
        let body = ApiErrorBody {
            success: false,
            error: ApiErrorMessage {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message("infra::http::api", self.status, diagnostic).attach(&mut response);
        response
    }
}

fn capitalized(entity: &str) -> String {
    let mut chars = entity.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity } => {
                ApiError::not_found(format!("{} not found", capitalized(entity)))
            }
            DomainError::Validation { message } => ApiError::validation(message),
            DomainError::Forbidden { entity } => {
                ApiError::forbidden(format!("You are not allowed to modify this {entity}"))
            }
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => {
                ApiError::conflict("Duplicate record").with_cause(constraint)
            }
            RepoError::NotFound => ApiError::not_found("Resource not found"),
            RepoError::InvalidInput { message } => ApiError::validation(message),
            RepoError::Integrity { message } => {
                ApiError::conflict("Integrity constraint violated").with_cause(message)
            }
            RepoError::Timeout => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
            ),
            RepoError::Persistence(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::DATABASE,
                "Database operation failed",
            )
            .with_cause(message),
        }
    }
}

impl From<RecipeError> for ApiError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::Domain(domain) => domain.into(),
            RecipeError::Slug(slug) => ApiError::validation(slug.to_string()),
            RecipeError::Repo(repo) => repo.into(),
        }
    }
}

impl From<InteractionError> for ApiError {
    fn from(err: InteractionError) -> Self {
        match err {
            InteractionError::Domain(domain) => domain.into(),
            InteractionError::AlreadyExists(kind) => {
                ApiError::conflict(format!("Recipe already has your {}", kind.as_str()))
            }
            InteractionError::Repo(repo) => repo.into(),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Domain(domain) => domain.into(),
            UserError::Repo(repo) => repo.into(),
        }
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing | AuthError::Invalid => ApiError::unauthorized(),
            AuthError::Expired => ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::TOKEN_EXPIRED,
                "Access token expired",
            ),
            AuthError::Revoked => ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::TOKEN_REVOKED,
                "Access token revoked",
            ),
        }
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::Domain(domain) => domain.into(),
            AuthServiceError::EmailTaken => ApiError::conflict("Email already registered"),
            AuthServiceError::InvalidCredentials => ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::UNAUTHORIZED,
                "Invalid email or password",
            ),
            AuthServiceError::Token(AccessTokenError::Rejected(_))
            | AuthServiceError::Token(AccessTokenError::Invalid(_)) => ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::UNAUTHORIZED,
                "Invalid or expired refresh token",
            ),
            AuthServiceError::Token(AccessTokenError::Repo(repo)) | AuthServiceError::Repo(repo) => {
                repo.into()
            }
            AuthServiceError::Password(password) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Authentication failed",
            )
            .with_cause(password.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NotConfigured => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::STORAGE_UNAVAILABLE,
                "File uploads are not configured",
            ),
            UploadError::Empty => ApiError::validation("Uploaded file is empty"),
            UploadError::UnsupportedType(_) => {
                ApiError::validation("Only JPEG, PNG and WebP images are allowed")
            }
            UploadError::UnknownFolder(folder) => {
                ApiError::validation(format!("Unknown upload folder `{folder}`"))
            }
            UploadError::TooLarge { limit } => ApiError::payload_too_large(limit),
            UploadError::Store(store) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                codes::STORAGE,
                "Failed to store file",
            )
            .with_cause(store.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation("Invalid request body").with_details(Value::String(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation("Invalid query string").with_details(Value::String(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request("Invalid path parameter").with_details(Value::String(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::application::repos::Reaction;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn envelope_carries_code_and_message() {
        let response = ApiError::from(DomainError::not_found("recipe")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());

        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "error": { "code": "NOT_FOUND", "message": "Recipe not found" }
            })
        );
    }

    #[test]
    fn duplicate_reactions_conflict() {
        let err = ApiError::from(InteractionError::AlreadyExists(Reaction::Like));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn persistence_details_stay_internal() {
        let response =
            ApiError::from(RepoError::Persistence("connection reset".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report");
        assert!(report.messages[0].contains("connection reset"));

        let body = body_json(response).await;
        assert!(!body.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn credential_failures_share_one_message() {
        let response = ApiError::from(AuthServiceError::InvalidCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Invalid email or password");

        let err = ApiError::from(AuthServiceError::EmailTaken);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err = ApiError::from(AuthServiceError::Token(AccessTokenError::Rejected(
            AuthError::Expired,
        )));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upload_errors_map_to_client_and_gateway_statuses() {
        assert_eq!(
            ApiError::from(UploadError::TooLarge { limit: 5 * 1024 * 1024 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(UploadError::UnsupportedType("image/gif".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UploadError::NotConfigured).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(UploadError::Store(
                crate::application::uploads::ObjectStoreError("denied".into())
            ))
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
