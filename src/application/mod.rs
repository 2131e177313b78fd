//! Application services layer.

pub mod access_tokens;
pub mod auth;
pub mod error;
pub mod interactions;
pub mod pagination;
pub mod passwords;
pub mod recipes;
pub mod repos;
pub mod uploads;
pub mod users;
