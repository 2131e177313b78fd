//! Response cache.
//!
//! - [`KvCache`]: fail-open façade over a [`KvStore`] (Redis or in-process)
//! - [`read_through`]: per-route GET caching keyed by path and sorted query
//! - [`invalidate_writes`] / [`CacheTrigger`]: pattern invalidation after
//!   writes and administrative purges across the KV store and the CDN
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! recipe_list_ttl_seconds = 300
//! recipe_detail_ttl_seconds = 600
//! # ... see config.rs for all options
//! ```

mod config;
pub mod keys;
mod kv;
mod memory;
mod middleware;
mod redis;
mod trigger;

pub use config::CacheConfig;
pub use keys::{InvalidationScope, response_key};
pub use kv::{KvCache, KvError, KvStore};
pub use memory::{MemoryStore, glob_match};
pub use middleware::{
    CACHE_BYPASS_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL, CachedResponse, ReadThrough,
    WriteInvalidation, X_CACHE, invalidate_writes, read_through,
};
pub use redis::{RedisConfig, RedisStore, backoff_delay};
pub use trigger::{CacheTrigger, KvOutcome, PurgeReport};
