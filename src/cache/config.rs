//! Response cache configuration.
//!
//! TTLs are chosen per route; the defaults mirror how quickly each
//! projection tends to go stale.

use std::num::NonZeroUsize;

use serde::Deserialize;

use super::memory::DEFAULT_MEMORY_ENTRIES;

pub const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_RECIPE_LIST_TTL_SECS: u64 = 300;
const DEFAULT_USER_RECIPES_TTL_SECS: u64 = 900;
const DEFAULT_RECIPE_DETAIL_TTL_SECS: u64 = 600;
const DEFAULT_USER_PROFILE_TTL_SECS: u64 = 300;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fallback TTL for routes without a dedicated setting.
    pub default_ttl_seconds: u64,
    /// `GET /api/recipes`
    pub recipe_list_ttl_seconds: u64,
    /// `GET /api/recipes/user/{user_id}`
    pub user_recipes_ttl_seconds: u64,
    /// `GET /api/recipes/{slug}`
    pub recipe_detail_ttl_seconds: u64,
    /// `GET /api/users/{id}`
    pub user_profile_ttl_seconds: u64,
    /// Responses larger than this are served but never stored.
    pub max_body_bytes: usize,
    /// Entry bound of the in-process store when no Redis host is set.
    pub memory_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECS,
            recipe_list_ttl_seconds: DEFAULT_RECIPE_LIST_TTL_SECS,
            user_recipes_ttl_seconds: DEFAULT_USER_RECIPES_TTL_SECS,
            recipe_detail_ttl_seconds: DEFAULT_RECIPE_DETAIL_TTL_SECS,
            user_profile_ttl_seconds: DEFAULT_USER_PROFILE_TTL_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            memory_max_entries: DEFAULT_MEMORY_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Clamped to one so a zero never disables the bound.
    pub fn memory_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
