//! Cloudflare zone API client for edge cache purges and analytics.
//!
//! Purges are best-effort: every failure is logged and reported as a
//! [`CdnOutcome`], never returned as an error.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use url::Url;

use super::error::InfraError;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Seven days, in minutes relative to now.
pub const DEFAULT_ANALYTICS_SINCE: i64 = -10080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    pub zone_id: Option<String>,
    pub api_token: Option<String>,
    /// Public base URL the CDN serves objects from.
    pub public_url: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            zone_id: None,
            api_token: None,
            public_url: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Result of a purge request as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CdnOutcome {
    Purged,
    NotConfigured,
    Failed,
}

impl CdnOutcome {
    pub fn is_purged(self) -> bool {
        self == CdnOutcome::Purged
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Clone)]
pub struct CdnClient {
    http: Client,
    config: Arc<CdnConfig>,
}

impl CdnClient {
    pub fn new(config: CdnConfig) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(concat!("sabor/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|err| InfraError::configuration(format!("cdn http client: {err}")))?;

        let client = Self {
            http,
            config: Arc::new(config),
        };
        info!(
            target = "sabor::infra::cdn",
            configured = client.is_configured(),
            public_url = client.public_base().unwrap_or(""),
            "cdn client initialised"
        );
        Ok(client)
    }

    /// Zone, token and public URL are all present.
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some() && self.public_base().is_some()
    }

    pub fn config(&self) -> &CdnConfig {
        &self.config
    }

    /// Purge exactly the listed URLs in one call.
    pub async fn purge_urls(&self, urls: &[String]) -> CdnOutcome {
        let Some((zone, _)) = self.credentials() else {
            warn!(target = "sabor::infra::cdn", "cdn not configured; skipping url purge");
            return CdnOutcome::NotConfigured;
        };
        if urls.is_empty() {
            return CdnOutcome::Purged;
        }

        let request = self.authorized(
            self.http
                .post(self.endpoint(zone, "purge_cache"))
                .json(&json!({ "files": urls })),
        );
        let outcome = self.send_purge(request).await;
        if outcome.is_purged() {
            info!(target = "sabor::infra::cdn", count = urls.len(), ?urls, "cdn urls purged");
        }
        outcome
    }

    /// Evict everything cached for the zone.
    pub async fn purge_all(&self) -> CdnOutcome {
        let Some((zone, _)) = self.credentials() else {
            warn!(target = "sabor::infra::cdn", "cdn not configured; skipping full purge");
            return CdnOutcome::NotConfigured;
        };

        let request = self.authorized(
            self.http
                .post(self.endpoint(zone, "purge_cache"))
                .json(&json!({ "purge_everything": true })),
        );
        let outcome = self.send_purge(request).await;
        if outcome.is_purged() {
            info!(target = "sabor::infra::cdn", "cdn zone purged");
        }
        outcome
    }

    /// Dashboard analytics for the zone, `since` minutes relative to now.
    pub async fn analytics(&self, since: i64) -> Option<Value> {
        let (zone, _) = self.credentials()?;
        let endpoint = format!("{}?since={since}", self.endpoint(zone, "analytics/dashboard"));
        let request = self.authorized(self.http.get(endpoint));

        match self.call(request).await {
            Ok(envelope) if envelope.success => envelope.result,
            Ok(envelope) => {
                warn!(target = "sabor::infra::cdn", errors = ?envelope.errors, "cdn analytics rejected");
                None
            }
            Err(err) => {
                warn!(target = "sabor::infra::cdn", error = %err, "cdn analytics request failed");
                None
            }
        }
    }

    /// Rewrite an S3 object URL onto the CDN base. Anything else is returned
    /// unchanged.
    pub fn to_public_url(&self, origin_url: &str) -> String {
        let Some(base) = self.public_base() else {
            return origin_url.to_string();
        };
        if origin_url.is_empty() || origin_url.starts_with(base) {
            return origin_url.to_string();
        }
        match s3_object_path(origin_url) {
            Some(path) => format!("{base}/{path}"),
            None => origin_url.to_string(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let zone = non_blank(self.config.zone_id.as_deref())?;
        let token = non_blank(self.config.api_token.as_deref())?;
        Some((zone, token))
    }

    fn public_base(&self) -> Option<&str> {
        non_blank(self.config.public_url.as_deref()).map(|base| base.trim_end_matches('/'))
    }

    fn endpoint(&self, zone: &str, path: &str) -> String {
        format!(
            "{}/zones/{zone}/{path}",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials() {
            Some((_, token)) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send_purge(&self, request: RequestBuilder) -> CdnOutcome {
        match self.call(request).await {
            Ok(envelope) if envelope.success => CdnOutcome::Purged,
            Ok(envelope) => {
                warn!(target = "sabor::infra::cdn", errors = ?envelope.errors, "cdn purge rejected");
                CdnOutcome::Failed
            }
            Err(err) => {
                warn!(target = "sabor::infra::cdn", error = %err, "cdn purge request failed");
                CdnOutcome::Failed
            }
        }
    }

    async fn call(&self, request: RequestBuilder) -> Result<ApiEnvelope, String> {
        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| err.to_string())?;
        serde_json::from_slice(&bytes).map_err(|err| {
            format!(
                "status {status}, undecodable body: {err}: {}",
                String::from_utf8_lossy(&bytes)
            )
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Object key of `https://<bucket>.s3.<region>.amazonaws.com/<key>`.
fn s3_object_path(candidate: &str) -> Option<String> {
    let url = Url::parse(candidate).ok()?;
    if url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?;
    let (bucket, rest) = host.split_once(".s3.")?;
    let region = rest.strip_suffix(".amazonaws.com")?;
    if bucket.is_empty() || region.is_empty() {
        return None;
    }

    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    })
}
