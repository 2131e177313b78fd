//! Image uploads to object storage, and removal of objects a write replaced.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use slug::slugify;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const MAX_NAME_LEN: usize = 50;
const FALLBACK_NAME: &str = "image";

#[derive(Debug, Error)]
#[error("object storage request failed: {0}")]
pub struct ObjectStoreError(pub String);

/// Bucket operations the upload path needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("object storage is not configured")]
    NotConfigured,
    #[error("uploaded file is empty")]
    Empty,
    #[error("file exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("unsupported content type `{0}`")]
    UnsupportedType(String),
    #[error("unknown upload folder `{0}`")]
    UnknownFolder(String),
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadFolder {
    #[default]
    Recipes,
    Avatars,
}

impl UploadFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadFolder::Recipes => "recipes",
            UploadFolder::Avatars => "avatars",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UploadError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "recipes" => Ok(UploadFolder::Recipes),
            "avatars" => Ok(UploadFolder::Avatars),
            other => Err(UploadError::UnknownFolder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadCommand {
    pub folder: UploadFolder,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    /// Origin URL; the HTTP layer rewrites it onto the CDN.
    pub url: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Clone)]
pub struct UploadService {
    store: Option<Arc<dyn ObjectStore>>,
    origin_base: Option<String>,
    public_base: Option<String>,
    max_bytes: usize,
}

impl UploadService {
    /// `origin_base` is where stored keys are served from before any CDN.
    pub fn new(store: Option<Arc<dyn ObjectStore>>, origin_base: Option<String>) -> Self {
        Self {
            store,
            origin_base: origin_base.map(|base| base.trim_end_matches('/').to_string()),
            public_base: None,
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Service with no bucket: uploads fail and cleanup does nothing.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// CDN base that also serves stored keys.
    pub fn with_public_base(mut self, public_base: Option<String>) -> Self {
        self.public_base = public_base.map(|base| base.trim_end_matches('/').to_string());
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some() && self.origin_base.is_some()
    }

    pub async fn upload(&self, cmd: UploadCommand) -> Result<StoredObject, UploadError> {
        let (Some(store), Some(origin)) = (self.store.as_ref(), self.origin_base.as_deref()) else {
            return Err(UploadError::NotConfigured);
        };
        if cmd.data.is_empty() {
            return Err(UploadError::Empty);
        }
        if cmd.data.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }
        let (content_type, extension) = image_type(&cmd.content_type)?;

        let key = object_key(cmd.folder, &cmd.filename, extension);
        let size = cmd.data.len();
        store.put_object(&key, cmd.data, content_type).await?;

        info!(target = "sabor::uploads", key = %key, size, "object stored");
        Ok(StoredObject {
            url: format!("{origin}/{key}"),
            key,
            size,
            content_type: content_type.to_string(),
        })
    }

    /// Bucket key behind a URL this service handed out, through the origin or
    /// the CDN. Foreign URLs have none.
    pub fn key_for(&self, url: &str) -> Option<String> {
        [self.origin_base.as_deref(), self.public_base.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|base| url.strip_prefix(base)?.strip_prefix('/'))
            .map(|key| key.split(['?', '#']).next().unwrap_or(key))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Delete the object behind `url`. Failures are logged, never returned:
    /// the row that referenced it is already gone or updated.
    pub async fn discard(&self, url: &str) {
        let (Some(store), Some(key)) = (self.store.as_ref(), self.key_for(url)) else {
            return;
        };
        match store.delete_object(&key).await {
            Ok(()) => info!(target = "sabor::uploads", key = %key, "object deleted"),
            Err(err) => warn!(
                target = "sabor::uploads",
                key = %key,
                error = %err,
                "failed to delete replaced object"
            ),
        }
    }

    /// Discard `previous` unless `current` still points at it.
    pub async fn discard_replaced(&self, previous: Option<&str>, current: Option<&str>) {
        if let Some(previous) = previous {
            if current != Some(previous) {
                self.discard(previous).await;
            }
        }
    }
}

fn image_type(content_type: &str) -> Result<(&'static str, &'static str), UploadError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Ok(("image/jpeg", "jpg")),
        "image/png" => Ok(("image/png", "png")),
        "image/webp" => Ok(("image/webp", "webp")),
        _ => Err(UploadError::UnsupportedType(content_type.to_string())),
    }
}

/// `folder/<name>-<unix millis>-<random>.<ext>`
fn object_key(folder: UploadFolder, filename: &str, extension: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map_or(filename, |(stem, _)| stem);
    let mut name = slugify(stem);
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
        name = name.trim_end_matches('-').to_string();
    }
    if name.is_empty() {
        name = FALLBACK_NAME.to_string();
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let random = &Uuid::new_v4().simple().to_string()[..16];
    format!("{}/{name}-{millis}-{random}.{extension}", folder.as_str())
}
