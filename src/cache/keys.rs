//! Cache key derivation and invalidation patterns.
//!
//! Response keys have the form `cache:<path>[?<query>]`. Query pairs are
//! sorted so that parameter order never splits one logical request across
//! several entries.

use url::form_urlencoded;

pub const KEY_PREFIX: &str = "cache:";

/// Matches every response entry.
pub const ALL_PATTERN: &str = "cache:*";
pub const RECIPES_PATTERN: &str = "cache:/api/recipes*";
pub const USERS_PATTERN: &str = "cache:/api/users*";

/// Derive the KV key for a request path and optional raw query string.
pub fn response_key(path: &str, query: Option<&str>) -> String {
    match query.map(normalize_query).filter(|q| !q.is_empty()) {
        Some(query) => format!("{KEY_PREFIX}{path}?{query}"),
        None => format!("{KEY_PREFIX}{path}"),
    }
}

/// Decode, sort by `(name, value)` and re-encode query pairs.
pub fn normalize_query(raw: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Collection a write affects, expressed as KV patterns to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Recipe writes plus likes, favorites and comments, which surface in
    /// recipe counts.
    Recipes,
    /// Profile edits; author summaries are embedded in recipe payloads.
    Users,
}

impl InvalidationScope {
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            InvalidationScope::Recipes => &[RECIPES_PATTERN],
            InvalidationScope::Users => &[USERS_PATTERN, RECIPES_PATTERN],
        }
    }
}
