//! Account registration and password login on top of [`AccessTokenService`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::access_tokens::{AccessTokenError, AccessTokenService, TokenPair};
use crate::application::passwords::{PasswordError, hash_password, verify_password};
use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::entities::{Account, UserRecord};
use crate::domain::error::DomainError;

const NAME_LEN: (usize, usize) = (2, 100);
const PASSWORD_LEN: (usize, usize) = (8, 128);
const EMAIL_MAX_LEN: usize = 254;

#[derive(Debug, Error)]
pub enum AuthServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Token(#[from] AccessTokenError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterCommand {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

/// A signed-in user and the tokens that prove it.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: UserRecord,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    tokens: Arc<AccessTokenService>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: Arc<AccessTokenService>) -> Self {
        Self { users, tokens }
    }

    pub async fn register(&self, cmd: RegisterCommand) -> Result<AuthSession, AuthServiceError> {
        let name = validate_name(&cmd.name)?;
        let email = normalize_email(&cmd.email)?;
        validate_password(&cmd.password)?;

        if self.users.find_credentials(&email).await?.is_some() {
            return Err(AuthServiceError::EmailTaken);
        }

        let password_hash = hash_password(cmd.password).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                email,
                name,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthServiceError::EmailTaken,
                other => other.into(),
            })?;

        info!(target = "sabor::auth", user_id = %user.id, "account registered");
        self.session(user).await
    }

    /// Unknown emails, accounts without a password and wrong passwords all
    /// fail the same way.
    pub async fn login(&self, cmd: LoginCommand) -> Result<AuthSession, AuthServiceError> {
        let email = cmd.email.trim().to_ascii_lowercase();
        let Some(credentials) = self.users.find_credentials(&email).await? else {
            return Err(AuthServiceError::InvalidCredentials);
        };
        let Some(stored) = credentials.password_hash else {
            return Err(AuthServiceError::InvalidCredentials);
        };
        if !verify_password(cmd.password, stored).await? {
            return Err(AuthServiceError::InvalidCredentials);
        }
        self.session(credentials.user).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthServiceError> {
        Ok(self.tokens.rotate(refresh_token).await?)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthServiceError> {
        self.tokens.revoke(refresh_token).await?;
        Ok(())
    }

    pub async fn me(&self, user_id: Uuid) -> Result<Account, AuthServiceError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(DomainError::not_found("user"))?;
        let counts = self.users.account_counts(user_id).await?;
        Ok(Account { user, counts })
    }

    async fn session(&self, user: UserRecord) -> Result<AuthSession, AuthServiceError> {
        let tokens = self.tokens.issue_pair(user.id).await?;
        Ok(AuthSession { user, tokens })
    }
}

fn validate_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < NAME_LEN.0 || len > NAME_LEN.1 {
        return Err(DomainError::validation(format!(
            "name must be between {} and {} characters",
            NAME_LEN.0, NAME_LEN.1
        )));
    }
    Ok(name.to_string())
}

fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = email.len() <= EMAIL_MAX_LEN
        && !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid {
        return Err(DomainError::validation("email must be a valid address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    let len = password.chars().count();
    if len < PASSWORD_LEN.0 || len > PASSWORD_LEN.1 {
        return Err(DomainError::validation(format!(
            "password must be between {} and {} characters",
            PASSWORD_LEN.0, PASSWORD_LEN.1
        )));
    }
    Ok(())
}
