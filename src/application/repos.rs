//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::entities::{
    AccessTokenRecord, AccountCounts, CommentRecord, CommentView, RecipeDetail, RecipeRecord,
    RecipeSummary, UserCredentials, UserProfile, UserRecord,
};
use crate::domain::types::{Difficulty, RecipeSort, SortOrder, TokenKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecipeQueryFilter {
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub difficulty: Option<Difficulty>,
    pub author_id: Option<Uuid>,
    pub sort_by: RecipeSort,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientParams {
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagParams {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct CreateRecipeParams {
    pub author_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub prep_minutes: i32,
    pub cook_minutes: i32,
    pub servings: i32,
    pub difficulty: Difficulty,
    pub instructions: Vec<String>,
    pub cover_image_url: Option<String>,
    pub ingredients: Vec<IngredientParams>,
    pub tags: Vec<TagParams>,
}

/// Partial update; `None` leaves the column untouched. Child collections,
/// when present, replace the existing rows.
#[derive(Debug, Clone, Default)]
pub struct UpdateRecipeParams {
    pub id: Uuid,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub prep_minutes: Option<i32>,
    pub cook_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub instructions: Option<Vec<String>>,
    pub cover_image_url: Option<Option<String>>,
    pub ingredients: Option<Vec<IngredientParams>>,
    pub tags: Option<Vec<TagParams>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub id: Uuid,
    pub name: Option<String>,
    pub bio: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct CreateAccessTokenParams {
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub recipe_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}

#[async_trait]
pub trait RecipesRepo: Send + Sync {
    async fn list_recipes(
        &self,
        filter: &RecipeQueryFilter,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError>;

    async fn find_recipe(&self, id: Uuid) -> Result<Option<RecipeRecord>, RepoError>;

    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<RecipeDetail>, RepoError>;

    async fn find_detail(&self, id: Uuid) -> Result<Option<RecipeDetail>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn increment_views(&self, id: Uuid) -> Result<(), RepoError>;

    async fn create_recipe(&self, params: CreateRecipeParams) -> Result<RecipeDetail, RepoError>;

    async fn update_recipe(&self, params: UpdateRecipeParams) -> Result<RecipeDetail, RepoError>;

    async fn delete_recipe(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_profile(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError>;

    /// Create the user, or refresh the display name of an existing email.
    async fn upsert_by_email(&self, email: &str, name: &str) -> Result<UserRecord, RepoError>;

    /// Fails with [`RepoError::Duplicate`] when the email is taken.
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError>;

    async fn account_counts(&self, id: Uuid) -> Result<AccountCounts, RepoError>;

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;
}

#[async_trait]
pub trait AccessTokensRepo: Send + Sync {
    async fn create_token(
        &self,
        params: CreateAccessTokenParams,
    ) -> Result<AccessTokenRecord, RepoError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<AccessTokenRecord>, RepoError>;

    async fn update_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;

    /// Returns `false` when the token was already revoked or is unknown.
    async fn revoke_token(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError>;
}

/// Likes and favorites share a shape: one row per `(user, recipe)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Favorite,
}

impl Reaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Like => "like",
            Reaction::Favorite => "favorite",
        }
    }
}

#[async_trait]
pub trait InteractionsRepo: Send + Sync {
    /// Fails with [`RepoError::Duplicate`] when the pair already exists.
    async fn add_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<(), RepoError>;

    /// Returns `false` when there was nothing to remove.
    async fn remove_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, RepoError>;

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError>;

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentView, RepoError>;

    async fn list_comments(
        &self,
        recipe_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<CommentView>, RepoError>;

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError>;

    async fn delete_comment(&self, id: Uuid) -> Result<(), RepoError>;
}
