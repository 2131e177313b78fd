//! Recipe-sharing JSON API with a fail-open read-through cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
