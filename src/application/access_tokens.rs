//! Opaque tokens of the form `<tag>_<prefix>_<secret>`.
//!
//! `sc_` tokens authorize API calls. `sr_` refresh tokens are only accepted by
//! [`AccessTokenService::rotate`], which revokes them and mints a new pair.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{
    AccessTokensRepo, CreateAccessTokenParams, RepoError, UsersRepo,
};
use crate::domain::entities::{AccessTokenRecord, UserRecord};
use crate::domain::types::TokenKind;

const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_ACCESS_TTL: Duration = Duration::minutes(15);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(7);

#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("invalid token request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Rejected(#[from] AuthError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing access token")]
    Missing,
    #[error("invalid access token")]
    Invalid,
    #[error("expired access token")]
    Expired,
    #[error("revoked access token")]
    Revoked,
}

#[derive(Debug, Clone)]
pub struct IssueTokenCommand {
    pub email: String,
    pub name: String,
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TokenIssued {
    pub user: UserRecord,
    pub token: String,
    pub expires_at: Option<OffsetDateTime>,
}

/// Lifetimes of the tokens minted by [`AccessTokenService::issue_pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TTL,
            refresh: DEFAULT_REFRESH_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

/// Identity resolved from a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub prefix: String,
}

#[derive(Clone)]
pub struct AccessTokenService {
    users: Arc<dyn UsersRepo>,
    tokens: Arc<dyn AccessTokensRepo>,
    lifetimes: TokenLifetimes,
}

impl AccessTokenService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: Arc<dyn AccessTokensRepo>) -> Self {
        Self {
            users,
            tokens,
            lifetimes: TokenLifetimes::default(),
        }
    }

    pub fn with_lifetimes(mut self, lifetimes: TokenLifetimes) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    /// Upsert the user by email and mint a fresh token for them.
    pub async fn issue(&self, cmd: IssueTokenCommand) -> Result<TokenIssued, AccessTokenError> {
        let email = cmd.email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AccessTokenError::Invalid(format!(
                "`{}` is not an email address",
                cmd.email
            )));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(AccessTokenError::Invalid("name must not be empty".into()));
        }

        let user = self.users.upsert_by_email(&email, name).await?;

        let expires_at = cmd
            .expires_in_days
            .map(|days| OffsetDateTime::now_utc() + Duration::days(i64::from(days)));
        let token = self.mint(user.id, TokenKind::Access, expires_at).await?;

        Ok(TokenIssued {
            user,
            token,
            expires_at,
        })
    }

    /// Short-lived access token plus the refresh token that renews it.
    pub async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, RepoError> {
        let now = OffsetDateTime::now_utc();
        let access_expires_at = now + self.lifetimes.access;
        let refresh_expires_at = now + self.lifetimes.refresh;

        let access_token = self
            .mint(user_id, TokenKind::Access, Some(access_expires_at))
            .await?;
        let refresh_token = self
            .mint(user_id, TokenKind::Refresh, Some(refresh_expires_at))
            .await?;

        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }

    /// Trade a live refresh token for a new pair; the old one stops working.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AccessTokenError> {
        let record = self.verify(refresh_token, TokenKind::Refresh).await?;
        if !self
            .tokens
            .revoke_token(record.id, OffsetDateTime::now_utc())
            .await?
        {
            // Lost a race with another rotation of the same token.
            return Err(AuthError::Revoked.into());
        }
        Ok(self.issue_pair(record.user_id).await?)
    }

    /// Revoke a refresh token. Unknown or already revoked tokens are ignored.
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, AccessTokenError> {
        match self.verify(refresh_token, TokenKind::Refresh).await {
            Ok(record) => Ok(self
                .tokens
                .revoke_token(record.id, OffsetDateTime::now_utc())
                .await?),
            Err(_) => Ok(false),
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let record = self.verify(token, TokenKind::Access).await?;
        let now = OffsetDateTime::now_utc();

        // best-effort last_used update; do not block auth
        let tokens = self.tokens.clone();
        let token_id = record.id;
        tokio::spawn(async move {
            let _ = tokens.update_last_used(token_id, now).await;
        });

        Ok(Principal {
            user_id: record.user_id,
            token_id: record.id,
            prefix: record.prefix,
        })
    }

    async fn verify(&self, token: &str, kind: TokenKind) -> Result<AccessTokenRecord, AuthError> {
        let parsed = Self::parse_token(token, kind).ok_or(AuthError::Invalid)?;
        let record = self
            .tokens
            .find_by_prefix(&parsed.prefix)
            .await
            .map_err(|_| AuthError::Invalid)?
            .ok_or(AuthError::Invalid)?;
        if record.kind != kind {
            return Err(AuthError::Invalid);
        }

        let now = OffsetDateTime::now_utc();
        if record.revoked_at.is_some_and(|at| at <= now) {
            return Err(AuthError::Revoked);
        }
        if record.expires_at.is_some_and(|at| at <= now) {
            return Err(AuthError::Expired);
        }

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }
        Ok(record)
    }

    async fn mint(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<String, RepoError> {
        let prefix = Self::generate_prefix();
        let secret = Self::generate_secret();
        let token = format!("{}_{prefix}_{secret}", kind.tag());

        self.tokens
            .create_token(CreateAccessTokenParams {
                user_id,
                kind,
                prefix,
                hashed_secret: Self::hash_secret(&secret),
                expires_at,
            })
            .await?;
        Ok(token)
    }

    /// Lookup prefix of a syntactically valid access token, without verifying it.
    pub fn token_prefix(token: &str) -> Option<String> {
        Self::parse_token(token, TokenKind::Access).map(|parsed| parsed.prefix)
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_prefix() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str, kind: TokenKind) -> Option<ParsedToken> {
        let mut parts = token.splitn(3, '_');
        if parts.next()? != kind.tag() {
            return None;
        }
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
            return None;
        }
        Some(ParsedToken {
            prefix: prefix.to_string(),
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    prefix: String,
    secret: String,
}
