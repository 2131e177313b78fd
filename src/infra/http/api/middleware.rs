use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::application::access_tokens::{AccessTokenService, AuthError};

use super::error::ApiError;
use super::state::ApiState;

/// Resolve the bearer token into a [`Principal`](crate::application::access_tokens::Principal)
/// request extension, rejecting the request otherwise.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::from(AuthError::Missing).into_response();
    };

    let principal = match state.tokens.authenticate(&token).await {
        Ok(principal) => principal,
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(principal.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

/// Sliding-window limit on write routes, keyed by token prefix or client address.
pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(request.headers());

    if !state.rate_limiter.allow(&key) {
        debug!(
            target = "sabor::api::ratelimit",
            key = %key,
            limit = state.rate_limiter.limit(),
            "write rate limit exceeded"
        );
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

/// Credential endpoints are limited per client address only, so rotating
/// tokens cannot reset the window.
pub async fn auth_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = address_key(request.headers());

    if !state.login_limiter.allow(&key) {
        debug!(
            target = "sabor::api::ratelimit",
            key = %key,
            limit = state.login_limiter.limit(),
            "login rate limit exceeded"
        );
        return ApiError::rate_limited(state.login_limiter.retry_after_secs());
    }

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}

fn client_key(headers: &HeaderMap) -> String {
    if let Some(prefix) = bearer_token(headers)
        .as_deref()
        .and_then(AccessTokenService::token_prefix)
    {
        return format!("token:{prefix}");
    }
    address_key(headers)
}

fn address_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("ip:{ip}"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn client_key_prefers_token_prefix() {
        let secret = "s".repeat(40);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers), "ip:203.0.113.7");

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer sc_pfx_{secret}")).expect("header"),
        );
        assert_eq!(client_key(&headers), "token:pfx");

        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn address_key_ignores_bearer_tokens() {
        let secret = "s".repeat(40);
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer sc_pfx_{secret}")).expect("header"),
        );
        assert_eq!(address_key(&headers), "ip:198.51.100.4");
    }
}
