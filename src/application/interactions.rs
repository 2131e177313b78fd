//! Likes, favorites and comments on recipes.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreateCommentParams, InteractionsRepo, Reaction, RecipesRepo, RepoError,
};
use crate::domain::entities::{CommentView, RecipeSummary};
use crate::domain::error::DomainError;

const COMMENT_MAX_LEN: usize = 1000;

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{} already exists", .0.as_str())]
    AlreadyExists(Reaction),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentCommand {
    pub content: String,
}

#[derive(Clone)]
pub struct InteractionService {
    recipes: Arc<dyn RecipesRepo>,
    interactions: Arc<dyn InteractionsRepo>,
}

impl InteractionService {
    pub fn new(recipes: Arc<dyn RecipesRepo>, interactions: Arc<dyn InteractionsRepo>) -> Self {
        Self {
            recipes,
            interactions,
        }
    }

    pub async fn react(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<(), InteractionError> {
        self.ensure_recipe(recipe_id).await?;
        match self.interactions.add_reaction(kind, user_id, recipe_id).await {
            Ok(()) => Ok(()),
            Err(RepoError::Duplicate { .. }) => Err(InteractionError::AlreadyExists(kind)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn unreact(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<(), InteractionError> {
        let removed = self
            .interactions
            .remove_reaction(kind, user_id, recipe_id)
            .await?;
        if !removed {
            return Err(DomainError::not_found(kind.as_str()).into());
        }
        Ok(())
    }

    pub async fn favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, InteractionError> {
        Ok(self.interactions.list_favorites(user_id, page).await?)
    }

    pub async fn comment(
        &self,
        author_id: Uuid,
        recipe_id: Uuid,
        cmd: CreateCommentCommand,
    ) -> Result<CommentView, InteractionError> {
        let content = cmd.content.trim();
        let len = content.chars().count();
        if len == 0 || len > COMMENT_MAX_LEN {
            return Err(DomainError::validation(format!(
                "content must be between 1 and {COMMENT_MAX_LEN} characters"
            ))
            .into());
        }
        self.ensure_recipe(recipe_id).await?;

        let view = self
            .interactions
            .create_comment(CreateCommentParams {
                recipe_id,
                author_id,
                content: content.to_string(),
            })
            .await?;
        Ok(view)
    }

    pub async fn comments(
        &self,
        recipe_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<CommentView>, InteractionError> {
        self.ensure_recipe(recipe_id).await?;
        Ok(self.interactions.list_comments(recipe_id, page).await?)
    }

    pub async fn delete_comment(
        &self,
        actor_id: Uuid,
        comment_id: Uuid,
    ) -> Result<(), InteractionError> {
        let comment = self
            .interactions
            .find_comment(comment_id)
            .await?
            .ok_or(DomainError::not_found("comment"))?;
        if comment.author_id != actor_id {
            return Err(DomainError::forbidden("comment").into());
        }
        self.interactions.delete_comment(comment_id).await?;
        Ok(())
    }

    async fn ensure_recipe(&self, recipe_id: Uuid) -> Result<(), InteractionError> {
        self.recipes
            .find_recipe(recipe_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("recipe").into())
    }
}
