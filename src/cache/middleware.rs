//! Read-through response caching and write-triggered invalidation.
//!
//! Both middlewares are attached per route with
//! `axum::middleware::from_fn_with_state`, so each route picks its own TTL
//! and invalidation scope.

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{
    config::DEFAULT_MAX_BODY_BYTES,
    keys::{InvalidationScope, response_key},
    kv::KvCache,
    trigger::CacheTrigger,
};

pub const CACHE_HIT_TOTAL: &str = "sabor_cache_hit_total";
pub const CACHE_MISS_TOTAL: &str = "sabor_cache_miss_total";
pub const CACHE_BYPASS_TOTAL: &str = "sabor_cache_bypass_total";

pub const X_CACHE: &str = "x-cache";

/// Stored projection of a successful JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, self.content_type)
            .header(X_CACHE, HeaderValue::from_static("HIT"))
            .body(Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Per-route read-through settings.
#[derive(Clone)]
pub struct ReadThrough {
    pub kv: KvCache,
    pub ttl_seconds: u64,
    pub max_body_bytes: usize,
}

impl ReadThrough {
    pub fn new(kv: KvCache, ttl_seconds: u64) -> Self {
        Self {
            kv,
            ttl_seconds,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Serve GET requests from the KV store, populating it on a miss.
///
/// Only `2xx` JSON responses with a known size under the configured limit
/// are stored. Persistence happens on a spawned task so the client never
/// waits on the store.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn read_through(
    State(cache): State<ReadThrough>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        counter!(CACHE_BYPASS_TOTAL).increment(1);
        return next.run(request).await;
    }

    let key = response_key(request.uri().path(), request.uri().query());

    if let Some(cached) = cache.kv.get::<CachedResponse>(&key).await {
        counter!(CACHE_HIT_TOTAL).increment(1);
        debug!(target = "sabor::cache", key = %key, outcome = "hit", "serving cached response");
        return cached.into_response();
    }

    counter!(CACHE_MISS_TOTAL).increment(1);
    debug!(target = "sabor::cache", key = %key, outcome = "miss", "executing handler");

    let response = next.run(request).await;
    let Some(content_type) = storable_content_type(&response, cache.max_body_bytes) else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target = "sabor::cache", key = %key, error = %err, "failed to buffer response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => {
            let entry = CachedResponse {
                status: parts.status.as_u16(),
                content_type,
                body: text.to_string(),
            };
            let kv = cache.kv.clone();
            let ttl = cache.ttl_seconds;
            tokio::spawn(async move {
                kv.set(&key, &entry, ttl).await;
            });
            parts
                .headers
                .insert(X_CACHE, HeaderValue::from_static("MISS"));
        }
        Err(_) => {
            debug!(target = "sabor::cache", key = %key, "skipping non utf-8 body");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn storable_content_type(response: &Response, max_body_bytes: usize) -> Option<String> {
    if !response.status().is_success() {
        return None;
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())?;
    if !content_type.starts_with("application/json") {
        return None;
    }

    // Unknown-length bodies are streamed through untouched.
    let upper = response.body().size_hint().upper()?;
    if upper > max_body_bytes as u64 {
        return None;
    }

    Some(content_type.to_string())
}

/// Route-level invalidation settings.
#[derive(Clone)]
pub struct WriteInvalidation {
    pub trigger: CacheTrigger,
    pub scope: InvalidationScope,
}

impl WriteInvalidation {
    pub fn new(trigger: CacheTrigger, scope: InvalidationScope) -> Self {
        Self { trigger, scope }
    }
}

/// After a successful mutating request, drop the KV entries of the
/// affected collection before the response leaves.
#[instrument(skip_all, fields(path = %request.uri().path(), method = %request.method()))]
pub async fn invalidate_writes(
    State(invalidation): State<WriteInvalidation>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mutating = !is_safe(request.method());
    let response = next.run(request).await;

    if mutating && response.status().is_success() {
        invalidation.trigger.invalidate(invalidation.scope).await;
    }

    response
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
