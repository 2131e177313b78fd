pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{MethodRouter, delete, get, patch, post},
};

use crate::cache::{
    InvalidationScope, ReadThrough, WriteInvalidation, invalidate_writes, read_through,
};

/// Multipart framing around the image part.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Public JSON API.
///
/// Reads are wrapped in per-route read-through caching; writes are rate
/// limited, authenticated, and invalidate the collection they touch once the
/// handler succeeds.
pub fn build_api_router(state: ApiState) -> Router {
    let cache = state.cache.clone();
    let upload_body_limit = state.uploads.max_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/api/auth/register",
            credentials(post(handlers::register), &state),
        )
        .route("/api/auth/login", credentials(post(handlers::login), &state))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", authenticated(get(handlers::me), &state))
        .route(
            "/api/uploads",
            rate_limited(
                authenticated(post(handlers::upload_image), &state),
                &state,
            )
            .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route(
            "/api/recipes",
            cached(
                get(handlers::list_recipes),
                &state,
                cache.recipe_list_ttl_seconds,
            )
            .merge(write(
                post(handlers::create_recipe),
                &state,
                InvalidationScope::Recipes,
            )),
        )
        .route(
            "/api/recipes/user/{user_id}",
            cached(
                get(handlers::list_user_recipes),
                &state,
                cache.user_recipes_ttl_seconds,
            ),
        )
        // `{id}` holds the slug on GET and the recipe id on writes.
        .route(
            "/api/recipes/{id}",
            cached(
                get(handlers::get_recipe),
                &state,
                cache.recipe_detail_ttl_seconds,
            )
            .merge(write(
                patch(handlers::update_recipe).delete(handlers::delete_recipe),
                &state,
                InvalidationScope::Recipes,
            )),
        )
        .route(
            "/api/recipes/{id}/like",
            write(
                post(handlers::like_recipe).delete(handlers::unlike_recipe),
                &state,
                InvalidationScope::Recipes,
            ),
        )
        .route(
            "/api/recipes/{id}/favorite",
            write(
                post(handlers::favorite_recipe).delete(handlers::unfavorite_recipe),
                &state,
                InvalidationScope::Recipes,
            ),
        )
        .route(
            "/api/recipes/{id}/comments",
            get(handlers::list_comments).merge(write(
                post(handlers::create_comment),
                &state,
                InvalidationScope::Recipes,
            )),
        )
        .route(
            "/api/comments/{id}",
            write(
                delete(handlers::delete_comment),
                &state,
                InvalidationScope::Recipes,
            ),
        )
        .route(
            "/api/favorites",
            authenticated(get(handlers::list_favorites), &state),
        )
        .route(
            "/api/users/{id}",
            cached(
                get(handlers::get_user),
                &state,
                cache.user_profile_ttl_seconds,
            )
            .merge(write(
                patch(handlers::update_user),
                &state,
                InvalidationScope::Users,
            )),
        )
        .with_state(state)
}

fn cached(route: MethodRouter<ApiState>, state: &ApiState, ttl_seconds: u64) -> MethodRouter<ApiState> {
    let settings = ReadThrough::new(state.kv.clone(), ttl_seconds)
        .with_max_body_bytes(state.cache.max_body_bytes);
    route.layer(axum_middleware::from_fn_with_state(settings, read_through))
}

fn authenticated(route: MethodRouter<ApiState>, state: &ApiState) -> MethodRouter<ApiState> {
    route.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::api_auth,
    ))
}

fn write(
    route: MethodRouter<ApiState>,
    state: &ApiState,
    scope: InvalidationScope,
) -> MethodRouter<ApiState> {
    let invalidation = WriteInvalidation::new(state.trigger.clone(), scope);
    rate_limited(
        authenticated(
            route.layer(axum_middleware::from_fn_with_state(
                invalidation,
                invalidate_writes,
            )),
            state,
        ),
        state,
    )
}

fn rate_limited(route: MethodRouter<ApiState>, state: &ApiState) -> MethodRouter<ApiState> {
    route.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::api_rate_limit,
    ))
}

fn credentials(route: MethodRouter<ApiState>, state: &ApiState) -> MethodRouter<ApiState> {
    route.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::auth_rate_limit,
    ))
}
