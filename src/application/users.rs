use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{RepoError, UpdateUserParams, UsersRepo};
use crate::application::uploads::UploadService;
use crate::domain::entities::UserProfile;
use crate::domain::error::DomainError;

const NAME_LEN: (usize, usize) = (1, 100);
const BIO_MAX_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Profile fields a user may change; an empty string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileCommand {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UsersRepo>,
    uploads: UploadService,
}

impl UserService {
    pub fn new(repo: Arc<dyn UsersRepo>, uploads: UploadService) -> Self {
        Self { repo, uploads }
    }

    pub async fn profile(&self, id: Uuid) -> Result<UserProfile, UserError> {
        self.repo
            .find_profile(id)
            .await?
            .ok_or_else(|| DomainError::not_found("user").into())
    }

    pub async fn update_profile(
        &self,
        actor_id: Uuid,
        id: Uuid,
        cmd: UpdateProfileCommand,
    ) -> Result<UserProfile, UserError> {
        if actor_id != id {
            return Err(DomainError::forbidden("user").into());
        }

        let name = match cmd.name {
            Some(raw) => {
                let name = raw.trim().to_string();
                let len = name.chars().count();
                if len < NAME_LEN.0 || len > NAME_LEN.1 {
                    return Err(DomainError::validation(format!(
                        "name must be between {} and {} characters",
                        NAME_LEN.0, NAME_LEN.1
                    ))
                    .into());
                }
                Some(name)
            }
            None => None,
        };

        let bio = cmd.bio.map(clear_if_blank);
        if let Some(Some(bio)) = &bio {
            if bio.chars().count() > BIO_MAX_LEN {
                return Err(DomainError::validation(format!(
                    "bio must be at most {BIO_MAX_LEN} characters"
                ))
                .into());
            }
        }

        let avatar_url = cmd.avatar_url.map(clear_if_blank);
        let previous_avatar = match avatar_url {
            Some(_) => self.repo.find_user(id).await?.and_then(|user| user.avatar_url),
            None => None,
        };

        let updated = self
            .repo
            .update_user(UpdateUserParams {
                id,
                name,
                bio,
                avatar_url,
            })
            .await?;
        self.uploads
            .discard_replaced(previous_avatar.as_deref(), updated.avatar_url.as_deref())
            .await;

        self.profile(id).await
    }
}

fn clear_if_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optional_fields_clear() {
        assert_eq!(clear_if_blank("   ".into()), None);
        assert_eq!(clear_if_blank(" chef ".into()), Some("chef".into()));
    }
}
