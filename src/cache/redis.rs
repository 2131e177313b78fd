//! Redis-backed [`KvStore`] on a `deadpool-redis` connection pool.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{
    Config as PoolConfig, Pool, Runtime,
    redis::{self, AsyncCommands},
};
use tracing::{debug, info};
use url::Url;

use super::kv::{KvError, KvStore};

const DEFAULT_POOL_SIZE: usize = 16;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
const BACKOFF_STEP_MS: u64 = 50;
const BACKOFF_CAP_MS: u64 = 2000;
const SCAN_BATCH: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: usize,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Upper bound for a single attempt, connection checkout included.
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            pool_size: DEFAULT_POOL_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl RedisConfig {
    /// `redis://[default:<password>@]<host>:<port>/<database>`, with the
    /// password percent-encoded so reserved characters survive parsing.
    pub fn connection_url(&self) -> Result<Url, KvError> {
        let invalid = |what: &str| KvError::Connection(format!("invalid redis {what}"));

        let mut url = Url::parse("redis://localhost").map_err(|_| invalid("url"))?;
        url.set_host(Some(&self.host))
            .map_err(|err| KvError::Connection(format!("invalid redis host `{}`: {err}", self.host)))?;
        url.set_port(Some(self.port)).map_err(|()| invalid("port"))?;
        url.set_path(&format!("/{}", self.database));
        if let Some(password) = &self.password {
            url.set_username("default").map_err(|()| invalid("username"))?;
            url.set_password(Some(password))
                .map_err(|()| invalid("password"))?;
        }
        Ok(url)
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis((u64::from(attempt) * BACKOFF_STEP_MS).min(BACKOFF_CAP_MS))
}

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    max_retries: u32,
    response_timeout: Duration,
}

impl RedisStore {
    /// Build the pool. Connections are opened lazily, so an unreachable
    /// server surfaces as per-operation failures rather than here.
    pub fn new(config: &RedisConfig) -> Result<Self, KvError> {
        let mut cfg = PoolConfig::from_url(config.connection_url()?.to_string());
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| KvError::Connection(format!("failed to create redis pool: {err}")))?;

        info!(
            target = "sabor::cache::redis",
            host = %config.host,
            port = config.port,
            database = config.database,
            pool_size = config.pool_size,
            "redis store initialised"
        );

        Ok(Self {
            pool,
            max_retries: config.max_retries,
            response_timeout: config.response_timeout,
        })
    }

    pub fn close(&self) {
        self.pool.close();
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, KvError>
    where
        F: FnMut(Pool) -> Fut,
        Fut: Future<Output = Result<T, KvError>>,
    {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.response_timeout, call(self.pool.clone()))
                .await
                .unwrap_or(Err(KvError::Timeout));

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    debug!(
                        target = "sabor::cache::redis",
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying redis command"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn checkout_error(err: deadpool_redis::PoolError) -> KvError {
    KvError::Connection(err.to_string())
}

fn command_error(err: redis::RedisError) -> KvError {
    if err.is_timeout() {
        KvError::Timeout
    } else if err.is_connection_dropped() || err.is_connection_refusal() {
        KvError::Connection(err.to_string())
    } else {
        KvError::Command(err.to_string())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_retry("get", |pool| async move {
            let mut conn = pool.get().await.map_err(checkout_error)?;
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(command_error)
        })
        .await
    }

    async fn set_raw_ex(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), KvError> {
        self.with_retry("set_ex", |pool| {
            let value = value.clone();
            async move {
                let mut conn = pool.get().await.map_err(checkout_error)?;
                conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
                    .await
                    .map_err(command_error)
            }
        })
        .await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize, KvError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_retry("del", |pool| async move {
            let mut conn = pool.get().await.map_err(checkout_error)?;
            conn.del::<_, usize>(keys).await.map_err(command_error)
        })
        .await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.with_retry("scan", |pool| async move {
            let mut conn = pool.get().await.map_err(checkout_error)?;
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
                    .map_err(command_error)?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            keys.sort();
            keys.dedup();
            Ok(keys)
        })
        .await
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.with_retry("ping", |pool| async move {
            let mut conn = pool.get().await.map_err(checkout_error)?;
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map(|_| ())
                .map_err(command_error)
        })
        .await
    }
}
