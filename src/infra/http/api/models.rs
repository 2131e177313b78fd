use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::pagination::{Page, PageMeta, PageRequest, PaginationSettings};
use crate::application::pagination::PaginationError;
use crate::application::repos::RecipeQueryFilter;
use crate::application::auth::AuthSession;
use crate::application::uploads::StoredObject;
use crate::domain::entities::{Account, RecipeDetail, RecipeSummary, UserProfile, UserRecord};
use crate::domain::types::{Difficulty, RecipeSort, SortOrder};
use crate::infra::cdn::CdnClient;

use super::error::ApiError;

/// Success envelope shared by every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn page(page: Page<T>, request: PageRequest) -> Envelope<Vec<T>> {
        Envelope {
            success: true,
            meta: Some(PageMeta::new(request, page.total)),
            data: page.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenBody {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionBody {
    pub recipe_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn resolve(&self, settings: PaginationSettings) -> Result<PageRequest, PaginationError> {
        PageRequest::resolve(self.page, self.limit, settings)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Comma separated tag slugs; a recipe matches when it has any of them.
    pub tags: Option<String>,
    pub difficulty: Option<String>,
    pub sort_by: Option<RecipeSort>,
    pub order: Option<SortOrder>,
}

impl RecipeListQuery {
    pub fn page_request(&self, settings: PaginationSettings) -> Result<PageRequest, ApiError> {
        Ok(PageRequest::resolve(self.page, self.limit, settings)?)
    }

    pub fn filter(&self) -> Result<RecipeQueryFilter, ApiError> {
        let difficulty = match self.difficulty.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(raw) => Some(raw.parse::<Difficulty>().map_err(ApiError::validation)?),
        };

        let tags = self
            .tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();

        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(RecipeQueryFilter {
            search,
            tags,
            difficulty,
            author_id: None,
            sort_by: self.sort_by.unwrap_or_default(),
            order: self.order.unwrap_or_default(),
        })
    }
}

/// Rewrite stored cover URLs onto the CDN.
pub fn public_summary(cdn: &CdnClient, mut summary: RecipeSummary) -> RecipeSummary {
    if let Some(url) = summary.recipe.cover_image_url.take() {
        summary.recipe.cover_image_url = Some(cdn.to_public_url(&url));
    }
    summary
}

pub fn public_detail(cdn: &CdnClient, mut detail: RecipeDetail) -> RecipeDetail {
    detail.summary = public_summary(cdn, detail.summary);
    detail
}

pub fn public_profile(cdn: &CdnClient, mut profile: UserProfile) -> UserProfile {
    if let Some(url) = profile.avatar_url.take() {
        profile.avatar_url = Some(cdn.to_public_url(&url));
    }
    profile
}

fn public_user(cdn: &CdnClient, mut user: UserRecord) -> UserRecord {
    if let Some(url) = user.avatar_url.take() {
        user.avatar_url = Some(cdn.to_public_url(&url));
    }
    user
}

pub fn public_session(cdn: &CdnClient, mut session: AuthSession) -> AuthSession {
    session.user = public_user(cdn, session.user);
    session
}

pub fn public_account(cdn: &CdnClient, mut account: Account) -> Account {
    account.user = public_user(cdn, account.user);
    account
}

pub fn public_object(cdn: &CdnClient, mut object: StoredObject) -> StoredObject {
    object.url = cdn.to_public_url(&object.url);
    object
}
