//! Key-value store seam and its fail-open façade.
//!
//! [`KvStore`] is the raw transport and reports every failure. [`KvCache`]
//! wraps it for request paths: failures are logged and degrade to "empty
//! cache" so that no read or write ever fails because the store did.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv connection failed: {0}")]
    Connection(String),
    #[error("kv command failed: {0}")]
    Command(String),
    #[error("kv operation timed out")]
    Timeout,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend label used in logs and health output.
    fn backend(&self) -> &'static str;

    async fn get_raw(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_raw_ex(&self, key: &str, value: String, ttl_seconds: u64)
    -> Result<(), KvError>;

    /// Delete the given keys, returning how many existed.
    async fn delete_keys(&self, keys: &[String]) -> Result<usize, KvError>;

    /// Enumerate keys matching a glob pattern (`*`, `?`).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}

/// Cheap-to-clone handle shared by middleware, triggers and admin routes.
#[derive(Clone)]
pub struct KvCache {
    store: Arc<dyn KvStore>,
}

impl KvCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_raw(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(target = "sabor::cache::kv", key, error = %err, "kv get failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "sabor::cache::kv",
                    key,
                    error = %err,
                    "discarding undecodable kv entry"
                );
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target = "sabor::cache::kv", key, error = %err, "kv value not serializable");
                return;
            }
        };

        match self.store.set_raw_ex(key, raw, ttl_seconds.max(1)).await {
            Ok(()) => debug!(target = "sabor::cache::kv", key, ttl = ttl_seconds, "kv set"),
            Err(err) => {
                warn!(target = "sabor::cache::kv", key, ttl = ttl_seconds, error = %err, "kv set failed")
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete_keys(&[key.to_string()]).await {
            warn!(target = "sabor::cache::kv", key, error = %err, "kv delete failed");
        }
    }

    /// Delete every key matching `pattern`. Returns the number removed, or
    /// `None` when the store could not be reached.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Option<usize> {
        let keys = match self.store.scan_keys(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(target = "sabor::cache::kv", pattern, error = %err, "kv scan failed");
                return None;
            }
        };

        if keys.is_empty() {
            debug!(target = "sabor::cache::kv", pattern, "no keys matched");
            return Some(0);
        }

        match self.store.delete_keys(&keys).await {
            Ok(deleted) => {
                debug!(target = "sabor::cache::kv", pattern, deleted, "kv pattern delete");
                Some(deleted)
            }
            Err(err) => {
                warn!(
                    target = "sabor::cache::kv",
                    pattern,
                    matched = keys.len(),
                    error = %err,
                    "kv pattern delete failed"
                );
                None
            }
        }
    }

    pub async fn is_reachable(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "sabor::cache::kv", error = %err, "kv ping failed");
                false
            }
        }
    }
}
