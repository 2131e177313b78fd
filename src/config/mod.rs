//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::access_tokens::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, TokenLifetimes};
use crate::application::pagination::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PaginationSettings};
use crate::application::uploads::DEFAULT_MAX_UPLOAD_BYTES;
use crate::cache::{CacheConfig, RedisConfig};
use crate::infra::cdn::{CdnConfig, DEFAULT_API_BASE};
use crate::infra::storage::{DEFAULT_REGION, StorageConfig};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sabor";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 4000;
const DEFAULT_ADMIN_PORT: u16 = 4001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_REDIS_POOL_SIZE: u64 = 16;
const DEFAULT_REDIS_MAX_RETRIES: u32 = 3;
const DEFAULT_REDIS_RESPONSE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_CDN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 30;
const DEFAULT_LOGIN_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_LOGIN_MAX_ATTEMPTS: u64 = 5;

/// Command-line arguments for the Sabor binary.
#[derive(Debug, Parser)]
#[command(name = "sabor", version, about = "Sabor recipe API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SABOR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Manage API access tokens.
    Token(TokenArgs),
    /// Operate on the response cache.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Select the KV backend (redis|memory).
    #[arg(long = "kv-backend", value_name = "BACKEND")]
    pub kv_backend: Option<String>,

    /// Override the Redis host.
    #[arg(long = "redis-host", value_name = "HOST")]
    pub redis_host: Option<String>,

    /// Override the Redis port.
    #[arg(long = "redis-port", value_name = "PORT")]
    pub redis_port: Option<u16>,

    /// Override the write rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the write rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TokenCommand {
    /// Create (or refresh) a user by email and print a fresh bearer token.
    Issue(IssueTokenArgs),
}

#[derive(Debug, Args, Clone)]
pub struct IssueTokenArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Email identifying the user.
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    /// Display name stored on the user.
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Token lifetime; tokens never expire when omitted.
    #[arg(long = "expires-in-days", value_name = "DAYS")]
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Drop every cached response from the KV store and purge the CDN zone.
    #[command(name = "purge-all")]
    PurgeAll,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub kv: KvSettings,
    pub cdn: CdnConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub pagination: PaginationSettings,
    pub rate_limit: RateLimitSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    Redis,
    Memory,
}

impl FromStr for KvBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}` (expected redis|memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvSettings {
    pub backend: KvBackend,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub lifetimes: TokenLifetimes,
    /// Register and login attempts allowed per client address.
    pub login_limit: RateLimitSettings,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SABOR").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Token(args)) => match &args.command {
            TokenCommand::Issue(issue) => raw.apply_database_override(&issue.database),
        },
        Some(Command::Cache(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    cdn: RawCdnSettings,
    storage: RawStorageSettings,
    cache: CacheConfig,
    pagination: RawPaginationSettings,
    rate_limit: RawRateLimitSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.kv_backend.as_ref() {
            self.redis.backend = Some(backend.clone());
        }
        if let Some(host) = overrides.redis_host.as_ref() {
            self.redis.host = Some(host.clone());
        }
        if let Some(port) = overrides.redis_port {
            self.redis.port = Some(port);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            cdn,
            storage,
            cache,
            pagination,
            rate_limit,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            kv: build_kv_settings(redis)?,
            cdn: build_cdn_config(cdn)?,
            storage: build_storage_config(storage)?,
            cache: validate_cache_config(cache)?,
            pagination: build_pagination_settings(pagination)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_kv_settings(redis: RawRedisSettings) -> Result<KvSettings, LoadError> {
    let host = non_blank(redis.host);
    let backend = match redis.backend.as_deref() {
        Some(value) => {
            KvBackend::from_str(value).map_err(|reason| LoadError::invalid("redis.backend", reason))?
        }
        None if host.is_some() => KvBackend::Redis,
        None => KvBackend::Memory,
    };

    let port = redis.port.unwrap_or(DEFAULT_REDIS_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "redis.port",
            "port must be greater than zero",
        ));
    }

    let pool_size = non_zero_u32(
        redis.pool_size.unwrap_or(DEFAULT_REDIS_POOL_SIZE),
        "redis.pool_size",
    )?;

    let timeout_ms = redis
        .response_timeout_ms
        .unwrap_or(DEFAULT_REDIS_RESPONSE_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "redis.response_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(KvSettings {
        backend,
        redis: RedisConfig {
            host: host.unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
            port,
            password: non_blank(redis.password),
            database: redis.database.unwrap_or(0),
            pool_size: pool_size.get() as usize,
            max_retries: redis.max_retries.unwrap_or(DEFAULT_REDIS_MAX_RETRIES),
            response_timeout: Duration::from_millis(timeout_ms),
        },
    })
}

fn build_cdn_config(cdn: RawCdnSettings) -> Result<CdnConfig, LoadError> {
    let timeout_secs = cdn.timeout_seconds.unwrap_or(DEFAULT_CDN_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "cdn.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CdnConfig {
        zone_id: non_blank(cdn.zone_id),
        api_token: non_blank(cdn.api_token),
        public_url: non_blank(cdn.public_url),
        api_base: non_blank(cdn.api_base).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_storage_config(storage: RawStorageSettings) -> Result<StorageConfig, LoadError> {
    let max_upload_bytes = storage.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    if max_upload_bytes == 0 {
        return Err(LoadError::invalid(
            "storage.max_upload_bytes",
            "must be greater than zero",
        ));
    }

    Ok(StorageConfig {
        access_key_id: non_blank(storage.access_key_id),
        secret_access_key: non_blank(storage.secret_access_key),
        region: non_blank(storage.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        bucket: non_blank(storage.bucket),
        endpoint: non_blank(storage.endpoint),
        max_upload_bytes,
    })
}

fn validate_cache_config(cache: CacheConfig) -> Result<CacheConfig, LoadError> {
    let ttls = [
        ("cache.default_ttl_seconds", cache.default_ttl_seconds),
        ("cache.recipe_list_ttl_seconds", cache.recipe_list_ttl_seconds),
        ("cache.user_recipes_ttl_seconds", cache.user_recipes_ttl_seconds),
        ("cache.recipe_detail_ttl_seconds", cache.recipe_detail_ttl_seconds),
        ("cache.user_profile_ttl_seconds", cache.user_profile_ttl_seconds),
    ];
    for (key, value) in ttls {
        if value == 0 {
            return Err(LoadError::invalid(key, "must be greater than zero"));
        }
    }
    if cache.max_body_bytes == 0 {
        return Err(LoadError::invalid(
            "cache.max_body_bytes",
            "must be greater than zero",
        ));
    }
    if cache.memory_max_entries == 0 {
        return Err(LoadError::invalid(
            "cache.memory_max_entries",
            "must be greater than zero",
        ));
    }
    Ok(cache)
}

fn build_pagination_settings(
    pagination: RawPaginationSettings,
) -> Result<PaginationSettings, LoadError> {
    let default_limit = non_zero_u32(
        pagination.default_limit.unwrap_or(DEFAULT_PAGE_LIMIT).into(),
        "pagination.default_limit",
    )?;
    let max_limit = non_zero_u32(
        pagination.max_limit.unwrap_or(MAX_PAGE_LIMIT).into(),
        "pagination.max_limit",
    )?;
    if default_limit > max_limit {
        return Err(LoadError::invalid(
            "pagination.default_limit",
            "must not exceed pagination.max_limit",
        ));
    }

    Ok(PaginationSettings {
        default_limit: default_limit.get(),
        max_limit: max_limit.get(),
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds = non_zero_u32(
        rate_limit
            .window_seconds
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        "rate_limit.window_seconds",
    )?;
    let max_requests = non_zero_u32(
        rate_limit
            .max_requests
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
        "rate_limit.max_requests",
    )?;

    Ok(RateLimitSettings {
        window_seconds,
        max_requests,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let access_minutes = match auth.access_token_minutes {
        Some(minutes) => non_zero_u32(minutes, "auth.access_token_minutes")?.get().into(),
        None => DEFAULT_ACCESS_TTL.whole_minutes(),
    };
    let refresh_days = match auth.refresh_token_days {
        Some(days) => non_zero_u32(days, "auth.refresh_token_days")?.get().into(),
        None => DEFAULT_REFRESH_TTL.whole_days(),
    };
    let lifetimes = TokenLifetimes {
        access: time::Duration::minutes(access_minutes),
        refresh: time::Duration::days(refresh_days),
    };
    if lifetimes.access >= lifetimes.refresh {
        return Err(LoadError::invalid(
            "auth.access_token_minutes",
            "access tokens must expire before refresh tokens",
        ));
    }

    let login_limit = RateLimitSettings {
        window_seconds: non_zero_u32(
            auth.login_window_seconds.unwrap_or(DEFAULT_LOGIN_WINDOW_SECS),
            "auth.login_window_seconds",
        )?,
        max_requests: non_zero_u32(
            auth.login_max_attempts.unwrap_or(DEFAULT_LOGIN_MAX_ATTEMPTS),
            "auth.login_max_attempts",
        )?,
    };

    Ok(AuthSettings {
        lifetimes,
        login_limit,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    backend: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    database: Option<u32>,
    pool_size: Option<u64>,
    max_retries: Option<u32>,
    response_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    zone_id: Option<String>,
    api_token: Option<String>,
    public_url: Option<String>,
    api_base: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    region: Option<String>,
    bucket: Option<String>,
    endpoint: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPaginationSettings {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    access_token_minutes: Option<u64>,
    refresh_token_days: Option<u64>,
    login_window_seconds: Option<u64>,
    login_max_attempts: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_any_source() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.public_addr.to_string(), "0.0.0.0:4000");
        assert_eq!(settings.server.admin_addr.to_string(), "127.0.0.1:4001");
        assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(10));
        assert_eq!(settings.kv.backend, KvBackend::Memory);
        assert_eq!(settings.cdn.timeout, Duration::from_secs(5));
        assert_eq!(settings.storage.region, "us-east-1");
        assert_eq!(settings.pagination, PaginationSettings::default());
        assert_eq!(settings.rate_limit.max_requests.get(), 30);
        assert_eq!(settings.cache, CacheConfig::default());
        assert_eq!(settings.auth.lifetimes, TokenLifetimes::default());
        assert_eq!(settings.auth.login_limit.max_requests.get(), 5);
        assert_eq!(settings.auth.login_limit.window_seconds.get(), 900);
        assert_eq!(settings.storage.max_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn access_tokens_must_expire_before_refresh_tokens() {
        let mut raw = RawSettings::default();
        raw.auth.access_token_minutes = Some(8 * 24 * 60);
        let err = Settings::from_raw(raw).expect_err("access outlives refresh");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "auth.access_token_minutes",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.auth.access_token_minutes = Some(60);
        raw.auth.refresh_token_days = Some(30);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.auth.lifetimes.access, time::Duration::hours(1));
        assert_eq!(settings.auth.lifetimes.refresh, time::Duration::days(30));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.public_port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            public_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.public_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn redis_host_selects_redis_backend() {
        let mut raw = RawSettings::default();
        raw.redis.host = Some("cache.internal".into());
        raw.redis.password = Some("   ".into());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.kv.backend, KvBackend::Redis);
        assert_eq!(settings.kv.redis.host, "cache.internal");
        assert_eq!(settings.kv.redis.password, None);
        assert_eq!(settings.kv.redis.max_retries, 3);
        assert_eq!(settings.kv.redis.response_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn explicit_memory_backend_wins_over_host() {
        let mut raw = RawSettings::default();
        raw.redis.host = Some("cache.internal".into());
        raw.redis.backend = Some("Memory".into());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.kv.backend, KvBackend::Memory);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut raw = RawSettings::default();
        raw.redis.backend = Some("memcached".into());

        let err = Settings::from_raw(raw).expect_err("invalid backend");
        assert!(matches!(err, LoadError::Invalid { key: "redis.backend", .. }));
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.recipe_detail_ttl_seconds = 0;
        let err = Settings::from_raw(raw).expect_err("zero ttl");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.recipe_detail_ttl_seconds",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.server.admin_port = Some(0);
        assert!(Settings::from_raw(raw).is_err());

        let mut raw = RawSettings::default();
        raw.rate_limit.window_seconds = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn missing_cdn_credentials_degrade_quietly() {
        let mut raw = RawSettings::default();
        raw.cdn.zone_id = Some(String::new());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cdn.zone_id, None);
        assert_eq!(settings.cdn.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn default_limit_cannot_exceed_max() {
        let mut raw = RawSettings::default();
        raw.pagination.default_limit = Some(50);
        raw.pagination.max_limit = Some(20);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["sabor"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_token_issue_arguments() {
        let args = CliArgs::parse_from([
            "sabor",
            "token",
            "issue",
            "--email",
            "ana@example.com",
            "--name",
            "Ana",
            "--expires-in-days",
            "30",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("token command") {
            Command::Token(TokenArgs {
                command: TokenCommand::Issue(issue),
            }) => {
                assert_eq!(issue.email, "ana@example.com");
                assert_eq!(issue.name, "Ana");
                assert_eq!(issue.expires_in_days, Some(30));
                assert_eq!(
                    issue.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_cache_purge_all() {
        let args = CliArgs::parse_from(["sabor", "cache", "purge-all"]);
        assert!(matches!(
            args.command,
            Some(Command::Cache(CacheArgs {
                command: CacheCommand::PurgeAll
            }))
        ));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "sabor",
            "serve",
            "--server-host",
            "127.0.0.1",
            "--kv-backend",
            "redis",
            "--redis-host",
            "10.0.0.5",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
                assert_eq!(serve.overrides.kv_backend.as_deref(), Some("redis"));
                assert_eq!(serve.overrides.redis_host.as_deref(), Some("10.0.0.5"));
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
