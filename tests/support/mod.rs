//! In-memory adapters shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, Response};
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use sabor::application::access_tokens::{AccessTokenService, IssueTokenCommand};
use sabor::application::auth::AuthService;
use sabor::application::interactions::InteractionService;
use sabor::application::pagination::{Page, PageRequest, PaginationSettings};
use sabor::application::recipes::RecipeService;
use sabor::application::repos::{
    AccessTokensRepo, CreateAccessTokenParams, CreateCommentParams, CreateRecipeParams,
    CreateUserParams, InteractionsRepo, Reaction, RecipeQueryFilter, RecipesRepo, RepoError,
    TagParams, UpdateRecipeParams, UpdateUserParams, UsersRepo,
};
use sabor::application::uploads::{ObjectStore, ObjectStoreError, UploadService};
use sabor::application::users::UserService;
use sabor::cache::{CacheConfig, CacheTrigger, KvCache, KvError, KvStore, MemoryStore};
use sabor::domain::entities::{
    AccessTokenRecord, AccountCounts, AuthorSummary, CommentRecord, CommentView,
    IngredientRecord, RecipeCounts, RecipeDetail, RecipeRecord, RecipeSummary, TagRecord,
    UserCredentials, UserProfile, UserRecord,
};
use sabor::domain::types::{RecipeSort, SortOrder};
use sabor::infra::cdn::{CdnClient, CdnConfig};
use sabor::infra::http::{ApiRateLimiter, ApiState};

#[derive(Clone)]
struct StoredRecipe {
    record: RecipeRecord,
    ingredients: Vec<IngredientRecord>,
    tags: Vec<TagRecord>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    passwords: HashMap<Uuid, String>,
    tokens: Vec<AccessTokenRecord>,
    recipes: Vec<StoredRecipe>,
    likes: HashSet<(Uuid, Uuid)>,
    favorites: Vec<(Uuid, Uuid)>,
    comments: Vec<CommentRecord>,
}

/// Every repository trait over one set of in-memory tables.
#[derive(Default)]
pub struct MemoryRepos {
    tables: Mutex<Tables>,
    pub detail_lookups: AtomicUsize,
}

impl MemoryRepos {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn view_count(&self, id: Uuid) -> Option<i64> {
        let tables = self.tables.lock().await;
        tables
            .recipes
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| stored.record.view_count)
    }
}

impl Tables {
    fn author(&self, id: Uuid) -> AuthorSummary {
        match self.users.get(&id) {
            Some(user) => AuthorSummary {
                id,
                name: user.name.clone(),
                avatar_url: user.avatar_url.clone(),
            },
            None => AuthorSummary {
                id,
                name: String::new(),
                avatar_url: None,
            },
        }
    }

    fn summary(&self, stored: &StoredRecipe) -> RecipeSummary {
        let id = stored.record.id;
        RecipeSummary {
            recipe: stored.record.clone(),
            author: self.author(stored.record.author_id),
            tags: stored.tags.clone(),
            counts: RecipeCounts {
                likes: self.likes.iter().filter(|(_, r)| *r == id).count() as i64,
                favorites: self.favorites.iter().filter(|(_, r)| *r == id).count() as i64,
                comments: self.comments.iter().filter(|c| c.recipe_id == id).count() as i64,
            },
        }
    }

    fn detail(&self, stored: &StoredRecipe) -> RecipeDetail {
        RecipeDetail {
            summary: self.summary(stored),
            ingredients: stored.ingredients.clone(),
        }
    }

    fn recipe_mut(&mut self, id: Uuid) -> Option<&mut StoredRecipe> {
        self.recipes.iter_mut().find(|stored| stored.record.id == id)
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page::new(items, total)
}

fn tag_records(tags: Vec<TagParams>) -> Vec<TagRecord> {
    tags.into_iter()
        .map(|tag| TagRecord {
            id: Uuid::new_v4(),
            name: tag.name,
            slug: tag.slug,
        })
        .collect()
}

fn ingredient_records(items: Vec<sabor::application::repos::IngredientParams>) -> Vec<IngredientRecord> {
    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| IngredientRecord {
            id: Uuid::new_v4(),
            name: item.name,
            quantity: item.quantity,
            unit: item.unit,
            position: position as i32,
        })
        .collect()
}

#[async_trait]
impl RecipesRepo for MemoryRepos {
    async fn list_recipes(
        &self,
        filter: &RecipeQueryFilter,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError> {
        let tables = self.tables.lock().await;
        let search = filter.search.as_deref().map(str::to_lowercase);
        let mut matches: Vec<&StoredRecipe> = tables
            .recipes
            .iter()
            .filter(|stored| {
                let record = &stored.record;
                search.as_deref().is_none_or(|needle| {
                    record.title.to_lowercase().contains(needle)
                        || record.description.to_lowercase().contains(needle)
                }) && (filter.tags.is_empty()
                    || stored.tags.iter().any(|tag| filter.tags.contains(&tag.slug)))
                    && filter.difficulty.is_none_or(|d| record.difficulty == d)
                    && filter.author_id.is_none_or(|a| record.author_id == a)
            })
            .collect();

        matches.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                RecipeSort::CreatedAt => a.record.created_at.cmp(&b.record.created_at),
                RecipeSort::Title => a.record.title.cmp(&b.record.title),
                RecipeSort::ViewCount => a.record.view_count.cmp(&b.record.view_count),
            };
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let summaries = matches.into_iter().map(|s| tables.summary(s)).collect();
        Ok(paginate(summaries, page))
    }

    async fn find_recipe(&self, id: Uuid) -> Result<Option<RecipeRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipes
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| stored.record.clone()))
    }

    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<RecipeDetail>, RepoError> {
        self.detail_lookups.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().await;
        Ok(tables
            .recipes
            .iter()
            .find(|stored| stored.record.slug == slug)
            .map(|stored| tables.detail(stored)))
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<RecipeDetail>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipes
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| tables.detail(stored)))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.recipes.iter().any(|stored| stored.record.slug == slug))
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(stored) = tables.recipe_mut(id) {
            stored.record.view_count += 1;
        }
        Ok(())
    }

    async fn create_recipe(&self, params: CreateRecipeParams) -> Result<RecipeDetail, RepoError> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let stored = StoredRecipe {
            record: RecipeRecord {
                id: Uuid::new_v4(),
                slug: params.slug,
                title: params.title,
                description: params.description,
                prep_minutes: params.prep_minutes,
                cook_minutes: params.cook_minutes,
                servings: params.servings,
                difficulty: params.difficulty,
                instructions: params.instructions,
                cover_image_url: params.cover_image_url,
                view_count: 0,
                author_id: params.author_id,
                created_at: now,
                updated_at: now,
            },
            ingredients: ingredient_records(params.ingredients),
            tags: tag_records(params.tags),
        };
        let detail = tables.detail(&stored);
        tables.recipes.push(stored);
        Ok(detail)
    }

    async fn update_recipe(&self, params: UpdateRecipeParams) -> Result<RecipeDetail, RepoError> {
        let mut tables = self.tables.lock().await;
        let stored = tables.recipe_mut(params.id).ok_or(RepoError::NotFound)?;
        let record = &mut stored.record;
        if let Some(slug) = params.slug {
            record.slug = slug;
        }
        if let Some(title) = params.title {
            record.title = title;
        }
        if let Some(description) = params.description {
            record.description = description;
        }
        if let Some(value) = params.prep_minutes {
            record.prep_minutes = value;
        }
        if let Some(value) = params.cook_minutes {
            record.cook_minutes = value;
        }
        if let Some(value) = params.servings {
            record.servings = value;
        }
        if let Some(value) = params.difficulty {
            record.difficulty = value;
        }
        if let Some(steps) = params.instructions {
            record.instructions = steps;
        }
        if let Some(cover) = params.cover_image_url {
            record.cover_image_url = cover;
        }
        record.updated_at = OffsetDateTime::now_utc();
        if let Some(items) = params.ingredients {
            stored.ingredients = ingredient_records(items);
        }
        if let Some(tags) = params.tags {
            stored.tags = tag_records(tags);
        }
        let stored = stored.clone();
        Ok(tables.detail(&stored))
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.recipes.len();
        tables.recipes.retain(|stored| stored.record.id != id);
        if tables.recipes.len() == before {
            return Err(RepoError::NotFound);
        }
        tables.comments.retain(|comment| comment.recipe_id != id);
        tables.likes.retain(|(_, recipe)| *recipe != id);
        tables.favorites.retain(|(_, recipe)| *recipe != id);
        Ok(())
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).map(|user| UserProfile {
            id: user.id,
            name: user.name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            recipe_count: tables
                .recipes
                .iter()
                .filter(|stored| stored.record.author_id == id)
                .count() as i64,
            created_at: user.created_at,
        }))
    }

    async fn upsert_by_email(&self, email: &str, name: &str) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        if let Some(user) = tables.users.values_mut().find(|user| user.email == email) {
            user.name = name.to_string();
            user.updated_at = now;
            return Ok(user.clone());
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            bio: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|user| user.email == params.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: params.email,
            name: params.name,
            bio: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        tables.passwords.insert(user.id, params.password_hash);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.email == email)
            .map(|user| UserCredentials {
                user: user.clone(),
                password_hash: tables.passwords.get(&user.id).cloned(),
            }))
    }

    async fn account_counts(&self, id: Uuid) -> Result<AccountCounts, RepoError> {
        let tables = self.tables.lock().await;
        Ok(AccountCounts {
            recipes: tables
                .recipes
                .iter()
                .filter(|stored| stored.record.author_id == id)
                .count() as i64,
            favorites: tables.favorites.iter().filter(|(user, _)| *user == id).count() as i64,
            likes: tables.likes.iter().filter(|(user, _)| *user == id).count() as i64,
        })
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if let Some(name) = params.name {
            user.name = name;
        }
        if let Some(bio) = params.bio {
            user.bio = bio;
        }
        if let Some(avatar) = params.avatar_url {
            user.avatar_url = avatar;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[async_trait]
impl AccessTokensRepo for MemoryRepos {
    async fn create_token(
        &self,
        params: CreateAccessTokenParams,
    ) -> Result<AccessTokenRecord, RepoError> {
        let record = AccessTokenRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            kind: params.kind,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            expires_at: params.expires_at,
            revoked_at: None,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().await.tokens.push(record.clone());
        Ok(record)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<AccessTokenRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.tokens.iter().find(|t| t.prefix == prefix).cloned())
    }

    async fn update_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(token) = tables.tokens.iter_mut().find(|t| t.id == id) {
            token.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_token(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        match tables
            .tokens
            .iter_mut()
            .find(|t| t.id == id && t.revoked_at.is_none())
        {
            Some(token) => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl InteractionsRepo for MemoryRepos {
    async fn add_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let pair = (user_id, recipe_id);
        let inserted = match kind {
            Reaction::Like => tables.likes.insert(pair),
            Reaction::Favorite => {
                let exists = tables.favorites.contains(&pair);
                if !exists {
                    tables.favorites.push(pair);
                }
                !exists
            }
        };
        if inserted {
            Ok(())
        } else {
            Err(RepoError::Duplicate {
                constraint: format!("{}_pkey", kind.as_str()),
            })
        }
    }

    async fn remove_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let pair = (user_id, recipe_id);
        Ok(match kind {
            Reaction::Like => tables.likes.remove(&pair),
            Reaction::Favorite => {
                let before = tables.favorites.len();
                tables.favorites.retain(|existing| *existing != pair);
                tables.favorites.len() != before
            }
        })
    }

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError> {
        let tables = self.tables.lock().await;
        let summaries = tables
            .favorites
            .iter()
            .rev()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, recipe)| {
                tables
                    .recipes
                    .iter()
                    .find(|stored| stored.record.id == *recipe)
            })
            .map(|stored| tables.summary(stored))
            .collect();
        Ok(paginate(summaries, page))
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentView, RepoError> {
        let mut tables = self.tables.lock().await;
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            recipe_id: params.recipe_id,
            author_id: params.author_id,
            content: params.content,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.comments.push(comment.clone());
        Ok(CommentView {
            author: tables.author(comment.author_id),
            comment,
        })
    }

    async fn list_comments(
        &self,
        recipe_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<CommentView>, RepoError> {
        let tables = self.tables.lock().await;
        let views = tables
            .comments
            .iter()
            .rev()
            .filter(|comment| comment.recipe_id == recipe_id)
            .map(|comment| CommentView {
                author: tables.author(comment.author_id),
                comment: comment.clone(),
            })
            .collect();
        Ok(paginate(views, page))
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        if tables.comments.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

/// KV store that can be switched off mid-test and counts every call.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub down: AtomicBool,
    pub calls: AtomicUsize,
    pub last_ttl: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(KvError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check()?;
        self.inner.get_raw(key).await
    }

    async fn set_raw_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), KvError> {
        self.check()?;
        self.last_ttl.store(ttl_seconds, Ordering::SeqCst);
        self.inner.set_raw_ex(key, value, ttl_seconds).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize, KvError> {
        self.check()?;
        self.inner.delete_keys(keys).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.check()?;
        self.inner.scan_keys(pattern).await
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check()?;
        self.inner.ping().await
    }
}

/// Bucket that keeps objects in memory and records deletions.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: StdMutex<HashMap<String, (Bytes, String)>>,
    deleted: StdMutex<Vec<String>>,
    pub failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().expect("objects").keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("objects")
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted").clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ObjectStoreError("access denied".into()));
        }
        self.objects
            .lock()
            .expect("objects")
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ObjectStoreError("access denied".into()));
        }
        self.objects.lock().expect("objects").remove(key);
        self.deleted.lock().expect("deleted").push(key.to_string());
        Ok(())
    }
}

pub const ORIGIN_BASE: &str = "https://sabor-media.s3.us-east-1.amazonaws.com";

/// Wired application state over in-memory repositories.
pub struct TestApp {
    pub repos: Arc<MemoryRepos>,
    pub store: Arc<FlakyStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub state: ApiState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cdn(CdnConfig::default())
    }

    pub fn with_cdn(cdn: CdnConfig) -> Self {
        let objects = MemoryObjectStore::new();
        let public_base = cdn.public_url.clone();
        let uploads = UploadService::new(
            Some(objects.clone() as Arc<dyn ObjectStore>),
            Some(ORIGIN_BASE.to_string()),
        )
        .with_public_base(public_base);
        Self::build(cdn, objects, uploads)
    }

    /// App whose bucket is not configured.
    pub fn without_storage() -> Self {
        Self::build(
            CdnConfig::default(),
            MemoryObjectStore::new(),
            UploadService::disabled(),
        )
    }

    fn build(cdn: CdnConfig, objects: Arc<MemoryObjectStore>, uploads: UploadService) -> Self {
        let repos = MemoryRepos::new();
        let store = FlakyStore::new();
        let kv = KvCache::new(store.clone());
        let cdn = CdnClient::new(cdn).expect("cdn client");
        let trigger = CacheTrigger::new(kv.clone(), cdn.clone());
        let tokens = Arc::new(AccessTokenService::new(repos.clone(), repos.clone()));

        let state = ApiState {
            recipes: Arc::new(RecipeService::new(repos.clone(), uploads.clone())),
            interactions: Arc::new(InteractionService::new(repos.clone(), repos.clone())),
            users: Arc::new(UserService::new(repos.clone(), uploads.clone())),
            auth: Arc::new(AuthService::new(repos.clone(), tokens.clone())),
            tokens,
            uploads: Arc::new(uploads),
            cdn,
            pagination: PaginationSettings::default(),
            rate_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(60), 1000)),
            login_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(900), 5)),
            cache: CacheConfig::default(),
            kv,
            trigger,
        };

        Self {
            repos,
            store,
            objects,
            state,
        }
    }

    /// Create a user and return `(user_id, bearer token)`.
    pub async fn user(&self, email: &str, name: &str) -> (Uuid, String) {
        let issued = self
            .state
            .tokens
            .issue(IssueTokenCommand {
                email: email.to_string(),
                name: name.to_string(),
                expires_in_days: None,
            })
            .await
            .expect("issue token");
        (issued.user.id, issued.token)
    }

    pub async fn cached_keys(&self) -> Vec<String> {
        let mut keys = self.store.scan_keys("cache:*").await.unwrap_or_default();
        keys.sort();
        keys
    }

    /// Read-through persistence runs on a spawned task.
    pub async fn wait_for_key(&self, key: &str) {
        for _ in 0..100 {
            if self.cached_keys().await.iter().any(|k| k == key) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache key `{key}` never appeared");
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub const MULTIPART_BOUNDARY: &str = "sabor-test-boundary";

/// `multipart/form-data` upload with one file part and optional text parts.
pub fn multipart_request(
    uri: &str,
    token: Option<&str>,
    file: Option<(&str, &str, &str, &[u8])>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((field, filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request")
}

pub fn recipe_payload(title: &str) -> Value {
    serde_json::json!({
        "title": title,
        "description": "A weeknight classic from the north-east.",
        "prep_minutes": 15,
        "cook_minutes": 30,
        "servings": 4,
        "difficulty": "easy",
        "instructions": ["Soak the beans", "Simmer until tender"],
        "ingredients": [
            { "name": "Black beans", "quantity": "500", "unit": "g" },
            { "name": "Salt", "quantity": "1", "unit": "tsp" }
        ],
        "tags": ["Brasileira", "Feijão"]
    })
}
