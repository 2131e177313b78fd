use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateUserParams, RepoError, UpdateUserParams, UsersRepo},
    domain::entities::{AccountCounts, UserCredentials, UserProfile, UserRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AccountCountsRow {
    recipes: i64,
    favorites: i64,
    likes: i64,
}

#[derive(sqlx::FromRow)]
struct UserProfileRow {
    id: Uuid,
    name: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    recipe_count: i64,
    created_at: OffsetDateTime,
}

impl From<UserProfileRow> for UserProfile {
    fn from(row: UserProfileRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            recipe_count: row.recipe_count,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, name, bio, avatar_url, created_at, updated_at";

/// `Option<Option<T>>` as a (touch, value) pair for `CASE WHEN` updates.
fn split_patch(patch: Option<Option<String>>) -> (bool, Option<String>) {
    match patch {
        Some(value) => (true, value),
        None => (false, None),
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            r#"
            SELECT
                u.id, u.name, u.bio, u.avatar_url, u.created_at,
                (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipe_count
            FROM users u
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserProfile::from))
    }

    async fn upsert_by_email(&self, email: &str, name: &str) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, updated_at = now()
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(params.email)
        .bind(params.name)
        .bind(params.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| UserCredentials {
            user: row.user.into(),
            password_hash: row.password_hash,
        }))
    }

    async fn account_counts(&self, id: Uuid) -> Result<AccountCounts, RepoError> {
        let row = sqlx::query_as::<_, AccountCountsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM recipes WHERE author_id = $1) AS recipes,
                (SELECT COUNT(*) FROM favorites WHERE user_id = $1) AS favorites,
                (SELECT COUNT(*) FROM likes WHERE user_id = $1) AS likes
            "#,
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(AccountCounts {
            recipes: row.recipes,
            favorites: row.favorites,
            likes: row.likes,
        })
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let (set_bio, bio) = split_patch(params.bio);
        let (set_avatar, avatar_url) = split_patch(params.avatar_url);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                bio = CASE WHEN $3 THEN $4 ELSE bio END,
                avatar_url = CASE WHEN $5 THEN $6 ELSE avatar_url END,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(params.id)
        .bind(params.name)
        .bind(set_bio)
        .bind(bio)
        .bind(set_avatar)
        .bind(avatar_url)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRecord::from).ok_or(RepoError::NotFound)
    }
}
