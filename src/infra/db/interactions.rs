use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{CreateCommentParams, InteractionsRepo, Reaction, RepoError},
    domain::entities::{AuthorSummary, CommentRecord, CommentView, RecipeSummary},
};

use super::{
    PostgresRepositories, map_sqlx_error,
    recipes::{RECIPE_SUMMARY_SELECT, RecipeSummaryRow},
};

fn reaction_table(kind: Reaction) -> &'static str {
    match kind {
        Reaction::Like => "likes",
        Reaction::Favorite => "favorites",
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    recipe_id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            recipe_id: row.recipe_id,
            author_id: row.author_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentViewRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    author_name: String,
    author_avatar_url: Option<String>,
}

impl From<CommentViewRow> for CommentView {
    fn from(row: CommentViewRow) -> Self {
        let author = AuthorSummary {
            id: row.comment.author_id,
            name: row.author_name,
            avatar_url: row.author_avatar_url,
        };
        Self {
            comment: row.comment.into(),
            author,
        }
    }
}

#[async_trait]
impl InteractionsRepo for PostgresRepositories {
    async fn add_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<(), RepoError> {
        let sql = format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
            reaction_table(kind)
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(recipe_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        kind: Reaction,
        user_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<bool, RepoError> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            reaction_table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(recipe_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(RECIPE_SUMMARY_SELECT);
        qb.push(" INNER JOIN favorites fav ON fav.recipe_id = r.id WHERE fav.user_id = ");
        qb.push_bind(user_id);
        qb.push(" ORDER BY fav.created_at DESC, r.id ASC LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<RecipeSummaryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let items = self.hydrate_summaries(rows).await?;
        Ok(Page::new(items, total.max(0) as u64))
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentView, RepoError> {
        let row = sqlx::query_as::<_, CommentViewRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (id, recipe_id, author_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, recipe_id, author_id, content, created_at
            )
            SELECT
                i.id, i.recipe_id, i.author_id, i.content, i.created_at,
                u.name AS author_name,
                u.avatar_url AS author_avatar_url
            FROM inserted i
            INNER JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.recipe_id)
        .bind(params.author_id)
        .bind(params.content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn list_comments(
        &self,
        recipe_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<CommentView>, RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, CommentViewRow>(
            r#"
            SELECT
                c.id, c.recipe_id, c.author_id, c.content, c.created_at,
                u.name AS author_name,
                u.avatar_url AS author_avatar_url
            FROM comments c
            INNER JOIN users u ON u.id = c.author_id
            WHERE c.recipe_id = $1
            ORDER BY c.created_at DESC, c.id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipe_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let items = rows.into_iter().map(CommentView::from).collect();
        Ok(Page::new(items, total.max(0) as u64))
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "SELECT id, recipe_id, author_id, content, created_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn delete_comment(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
