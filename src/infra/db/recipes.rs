use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{
        CreateRecipeParams, IngredientParams, RecipeQueryFilter, RecipesRepo, RepoError,
        TagParams, UpdateRecipeParams,
    },
    domain::entities::{
        AuthorSummary, IngredientRecord, RecipeCounts, RecipeDetail, RecipeRecord, RecipeSummary,
        TagRecord,
    },
    domain::types::Difficulty,
};

use super::{PostgresRepositories, contains_pattern, map_sqlx_error};

pub(super) const RECIPE_SUMMARY_SELECT: &str = r#"
    SELECT
        r.id, r.slug, r.title, r.description, r.prep_minutes, r.cook_minutes,
        r.servings, r.difficulty, r.instructions, r.cover_image_url, r.view_count,
        r.author_id, r.created_at, r.updated_at,
        u.name AS author_name,
        u.avatar_url AS author_avatar_url,
        (SELECT COUNT(*) FROM likes l WHERE l.recipe_id = r.id) AS likes_count,
        (SELECT COUNT(*) FROM favorites f WHERE f.recipe_id = r.id) AS favorites_count,
        (SELECT COUNT(*) FROM comments c WHERE c.recipe_id = r.id) AS comments_count
    FROM recipes r
    INNER JOIN users u ON u.id = r.author_id
"#;

#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: Uuid,
    slug: String,
    title: String,
    description: String,
    prep_minutes: i32,
    cook_minutes: i32,
    servings: i32,
    difficulty: Difficulty,
    instructions: Vec<String>,
    cover_image_url: Option<String>,
    view_count: i64,
    author_id: Uuid,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<RecipeRow> for RecipeRecord {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            prep_minutes: row.prep_minutes,
            cook_minutes: row.cook_minutes,
            servings: row.servings,
            difficulty: row.difficulty,
            instructions: row.instructions,
            cover_image_url: row.cover_image_url,
            view_count: row.view_count,
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct RecipeSummaryRow {
    #[sqlx(flatten)]
    recipe: RecipeRow,
    author_name: String,
    author_avatar_url: Option<String>,
    likes_count: i64,
    favorites_count: i64,
    comments_count: i64,
}

impl RecipeSummaryRow {
    fn into_summary(self, tags: Vec<TagRecord>) -> RecipeSummary {
        let author = AuthorSummary {
            id: self.recipe.author_id,
            name: self.author_name,
            avatar_url: self.author_avatar_url,
        };
        RecipeSummary {
            recipe: self.recipe.into(),
            author,
            tags,
            counts: RecipeCounts {
                likes: self.likes_count,
                favorites: self.favorites_count,
                comments: self.comments_count,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecipeTagRow {
    recipe_id: Uuid,
    id: Uuid,
    name: String,
    slug: String,
}

#[derive(sqlx::FromRow)]
struct IngredientRow {
    id: Uuid,
    name: String,
    quantity: String,
    unit: String,
    position: i32,
}

impl From<IngredientRow> for IngredientRecord {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            quantity: row.quantity,
            unit: row.unit,
            position: row.position,
        }
    }
}

impl PostgresRepositories {
    fn push_recipe_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &RecipeQueryFilter) {
        qb.push(" WHERE TRUE");

        if let Some(search) = filter.search.as_ref() {
            let pattern = contains_pattern(search);
            qb.push(" AND (r.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR r.description ILIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\')");
        }

        if !filter.tags.is_empty() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            );
            qb.push_bind(filter.tags.clone());
            qb.push("))");
        }

        if let Some(difficulty) = filter.difficulty {
            qb.push(" AND r.difficulty = ");
            qb.push_bind(difficulty);
        }

        if let Some(author_id) = filter.author_id {
            qb.push(" AND r.author_id = ");
            qb.push_bind(author_id);
        }
    }

    /// Attach tags to summary rows in one round trip.
    pub(super) async fn hydrate_summaries(
        &self,
        rows: Vec<RecipeSummaryRow>,
    ) -> Result<Vec<RecipeSummary>, RepoError> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.recipe.id).collect();
        let mut tags = self.tags_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let recipe_tags = tags.remove(&row.recipe.id).unwrap_or_default();
                row.into_summary(recipe_tags)
            })
            .collect())
    }

    async fn tags_for(&self, recipe_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TagRecord>>, RepoError> {
        if recipe_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, RecipeTagRow>(
            r#"
            SELECT rt.recipe_id, t.id, t.name, t.slug
            FROM recipe_tags rt
            INNER JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = ANY($1)
            ORDER BY t.name ASC
            "#,
        )
        .bind(recipe_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<TagRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.recipe_id).or_default().push(TagRecord {
                id: row.id,
                name: row.name,
                slug: row.slug,
            });
        }
        Ok(grouped)
    }

    async fn find_detail_where(
        &self,
        column: &'static str,
        value: DetailKey<'_>,
    ) -> Result<Option<RecipeDetail>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(RECIPE_SUMMARY_SELECT);
        qb.push(" WHERE ");
        qb.push(column);
        qb.push(" = ");
        match value {
            DetailKey::Id(id) => qb.push_bind(id),
            DetailKey::Slug(slug) => qb.push_bind(slug.to_string()),
        };

        let row = qb
            .build_query_as::<RecipeSummaryRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let recipe_id = row.recipe.id;
        let summary = self
            .hydrate_summaries(vec![row])
            .await?
            .pop()
            .ok_or(RepoError::NotFound)?;

        let ingredients = sqlx::query_as::<_, IngredientRow>(
            r#"
            SELECT id, name, quantity, unit, position
            FROM ingredients
            WHERE recipe_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(recipe_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(RecipeDetail {
            summary,
            ingredients: ingredients.into_iter().map(IngredientRecord::from).collect(),
        }))
    }

    async fn insert_ingredients(
        tx: &mut Transaction<'_, Postgres>,
        recipe_id: Uuid,
        ingredients: &[IngredientParams],
    ) -> Result<(), RepoError> {
        for (position, ingredient) in ingredients.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO ingredients (id, recipe_id, name, quantity, unit, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(recipe_id)
            .bind(&ingredient.name)
            .bind(&ingredient.quantity)
            .bind(&ingredient.unit)
            .bind(position as i32)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    /// Connect existing tags by slug, creating the missing ones.
    async fn link_tags(
        tx: &mut Transaction<'_, Postgres>,
        recipe_id: Uuid,
        tags: &[TagParams],
    ) -> Result<(), RepoError> {
        for tag in tags {
            let tag_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO tags (id, name, slug)
                VALUES ($1, $2, $3)
                ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&tag.name)
            .bind(&tag.slug)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

            sqlx::query(
                r#"
                INSERT INTO recipe_tags (recipe_id, tag_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(recipe_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

enum DetailKey<'a> {
    Id(Uuid),
    Slug(&'a str),
}

#[async_trait]
impl RecipesRepo for PostgresRepositories {
    async fn list_recipes(
        &self,
        filter: &RecipeQueryFilter,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RepoError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipes r");
        Self::push_recipe_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(RECIPE_SUMMARY_SELECT);
        Self::push_recipe_filters(&mut qb, filter);
        qb.push(" ORDER BY ");
        qb.push(filter.sort_by.column());
        qb.push(" ");
        qb.push(filter.order.keyword());
        qb.push(", r.id ASC LIMIT ");
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

    async fn find_recipe(&self, id: Uuid) -> Result<Option<RecipeRecord>, RepoError> {
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT id, slug, title, description, prep_minutes, cook_minutes, servings,
                   difficulty, instructions, cover_image_url, view_count, author_id,
                   created_at, updated_at
            FROM recipes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RecipeRecord::from))
    }

    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<RecipeDetail>, RepoError> {
        self.find_detail_where("r.slug", DetailKey::Slug(slug)).await
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<RecipeDetail>, RepoError> {
        self.find_detail_where("r.id", DetailKey::Id(id)).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM recipes WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE recipes SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn create_recipe(&self, params: CreateRecipeParams) -> Result<RecipeDetail, RepoError> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO recipes (
                id, slug, title, description, prep_minutes, cook_minutes, servings,
                difficulty, instructions, cover_image_url, author_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(&params.slug)
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.prep_minutes)
        .bind(params.cook_minutes)
        .bind(params.servings)
        .bind(params.difficulty)
        .bind(&params.instructions)
        .bind(&params.cover_image_url)
        .bind(params.author_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::insert_ingredients(&mut tx, id, &params.ingredients).await?;
        Self::link_tags(&mut tx, id, &params.tags).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        self.find_detail(id).await?.ok_or(RepoError::NotFound)
    }

    async fn update_recipe(&self, params: UpdateRecipeParams) -> Result<RecipeDetail, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let (set_cover, cover) = match params.cover_image_url {
            Some(value) => (true, value),
            None => (false, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE recipes SET
                slug = COALESCE($2, slug),
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                prep_minutes = COALESCE($5, prep_minutes),
                cook_minutes = COALESCE($6, cook_minutes),
                servings = COALESCE($7, servings),
                difficulty = COALESCE($8, difficulty),
                instructions = COALESCE($9, instructions),
                cover_image_url = CASE WHEN $10 THEN $11 ELSE cover_image_url END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(params.id)
        .bind(&params.slug)
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.prep_minutes)
        .bind(params.cook_minutes)
        .bind(params.servings)
        .bind(params.difficulty)
        .bind(&params.instructions)
        .bind(set_cover)
        .bind(cover)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        if let Some(ingredients) = params.ingredients.as_ref() {
            sqlx::query("DELETE FROM ingredients WHERE recipe_id = $1")
                .bind(params.id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            Self::insert_ingredients(&mut tx, params.id, ingredients).await?;
        }

        if let Some(tags) = params.tags.as_ref() {
            sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
                .bind(params.id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            Self::link_tags(&mut tx, params.id, tags).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.find_detail(params.id).await?.ok_or(RepoError::NotFound)
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
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
