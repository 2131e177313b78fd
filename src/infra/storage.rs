//! S3-compatible object storage for uploaded images.
//!
//! Without credentials and a bucket the integration is reported as not
//! configured and uploads are refused; startup never fails on it.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::application::uploads::{DEFAULT_MAX_UPLOAD_BYTES, ObjectStore, ObjectStoreError};

pub const DEFAULT_REGION: &str = "us-east-1";
const CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
    /// Custom S3-compatible endpoint; AWS when unset.
    pub endpoint: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            region: DEFAULT_REGION.to_string(),
            bucket: None,
            endpoint: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl StorageConfig {
    /// Credentials and bucket are all present.
    pub fn is_configured(&self) -> bool {
        [&self.access_key_id, &self.secret_access_key, &self.bucket]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Base URL objects are served from before CDN rewriting.
    pub fn origin_base(&self) -> Option<String> {
        let bucket = self.bucket.as_deref().map(str::trim).filter(|b| !b.is_empty())?;
        match self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(endpoint) => Some(format!("{}/{bucket}", endpoint.trim_end_matches('/'))),
            None => Some(format!("https://{bucket}.s3.{}.amazonaws.com", self.region)),
        }
    }
}

/// [`ObjectStore`] over the AWS SDK; custom endpoints use path-style
/// addressing so MinIO and R2 work.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// `None` when credentials or the bucket are missing.
    pub async fn connect(config: &StorageConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let (Some(key_id), Some(secret), Some(bucket)) = (
            config.access_key_id.as_deref(),
            config.secret_access_key.as_deref(),
            config.bucket.as_deref(),
        ) else {
            return None;
        };

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(key_id, secret, None, None, "sabor-config"))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        let endpoint = config.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty());
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Some(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.trim().to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        debug!(target = "sabor::storage", key, bucket = %self.bucket, "put object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .content_disposition("inline")
            .cache_control(CACHE_CONTROL)
            .send()
            .await
            .map_err(|err| ObjectStoreError(DisplayErrorContext(err).to_string()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        debug!(target = "sabor::storage", key, bucket = %self.bucket, "delete object");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectStoreError(DisplayErrorContext(err).to_string()))?;
        Ok(())
    }
}
