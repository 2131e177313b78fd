use std::sync::Arc;

use crate::application::access_tokens::AccessTokenService;
use crate::application::auth::AuthService;
use crate::application::interactions::InteractionService;
use crate::application::pagination::PaginationSettings;
use crate::application::recipes::RecipeService;
use crate::application::uploads::UploadService;
use crate::application::users::UserService;
use crate::cache::{CacheConfig, CacheTrigger, KvCache};
use crate::infra::cdn::CdnClient;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub recipes: Arc<RecipeService>,
    pub interactions: Arc<InteractionService>,
    pub users: Arc<UserService>,
    pub tokens: Arc<AccessTokenService>,
    pub auth: Arc<AuthService>,
    pub uploads: Arc<UploadService>,
    pub cdn: CdnClient,
    pub pagination: PaginationSettings,
    pub rate_limiter: Arc<ApiRateLimiter>,
    /// Tighter window for register and login, keyed by client address.
    pub login_limiter: Arc<ApiRateLimiter>,
    pub cache: CacheConfig,
    pub kv: KvCache,
    pub trigger: CacheTrigger,
}
