//! Recipe listing, lookup and authoring rules.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreateRecipeParams, IngredientParams, RecipeQueryFilter, RecipesRepo, RepoError, TagParams,
    UpdateRecipeParams,
};
use crate::application::uploads::UploadService;
use crate::domain::entities::{RecipeDetail, RecipeSummary};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, UniqueSlugError, derive_slug, generate_unique_slug};
use crate::domain::types::Difficulty;

const TITLE_LEN: (usize, usize) = (3, 200);
const DESCRIPTION_LEN: (usize, usize) = (10, 1000);

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<UniqueSlugError<RepoError>> for RecipeError {
    fn from(err: UniqueSlugError<RepoError>) -> Self {
        match err {
            UniqueSlugError::Slug(slug) => RecipeError::Slug(slug),
            UniqueSlugError::Predicate(repo) => RecipeError::Repo(repo),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientInput {
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecipeCommand {
    pub title: String,
    pub description: String,
    pub prep_minutes: i32,
    pub cook_minutes: i32,
    pub servings: i32,
    pub difficulty: Difficulty,
    pub instructions: Vec<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    pub ingredients: Vec<IngredientInput>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecipeCommand {
    pub title: Option<String>,
    pub description: Option<String>,
    pub prep_minutes: Option<i32>,
    pub cook_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub instructions: Option<Vec<String>>,
    pub cover_image_url: Option<String>,
    pub ingredients: Option<Vec<IngredientInput>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct RecipeService {
    repo: Arc<dyn RecipesRepo>,
    uploads: UploadService,
}

impl RecipeService {
    /// `uploads` deletes cover images that an edit or delete leaves unreferenced.
    pub fn new(repo: Arc<dyn RecipesRepo>, uploads: UploadService) -> Self {
        Self { repo, uploads }
    }

    pub async fn list(
        &self,
        filter: &RecipeQueryFilter,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RecipeError> {
        Ok(self.repo.list_recipes(filter, page).await?)
    }

    pub async fn list_by_author(
        &self,
        author_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<RecipeSummary>, RecipeError> {
        let filter = RecipeQueryFilter {
            author_id: Some(author_id),
            ..RecipeQueryFilter::default()
        };
        Ok(self.repo.list_recipes(&filter, page).await?)
    }

    /// Fetch a recipe for display and count the view.
    pub async fn view_by_slug(&self, slug: &str) -> Result<RecipeDetail, RecipeError> {
        let detail = self
            .repo
            .find_detail_by_slug(slug)
            .await?
            .ok_or(DomainError::not_found("recipe"))?;

        if let Err(err) = self.repo.increment_views(detail.summary.recipe.id).await {
            warn!(
                target = "sabor::application::recipes",
                recipe_id = %detail.summary.recipe.id,
                error = %err,
                "failed to increment view count"
            );
        }

        Ok(detail)
    }

    pub async fn create(
        &self,
        author_id: Uuid,
        cmd: CreateRecipeCommand,
    ) -> Result<RecipeDetail, RecipeError> {
        let title = validate_title(&cmd.title)?;
        let description = validate_description(&cmd.description)?;
        validate_positive("prep_minutes", cmd.prep_minutes)?;
        validate_positive("cook_minutes", cmd.cook_minutes)?;
        validate_positive("servings", cmd.servings)?;
        let instructions = validate_instructions(cmd.instructions)?;
        let ingredients = validate_ingredients(cmd.ingredients)?;
        let tags = normalize_tags(cmd.tags)?;

        let slug = self.unique_slug(&title).await?;

        let detail = self
            .repo
            .create_recipe(CreateRecipeParams {
                author_id,
                slug,
                title,
                description,
                prep_minutes: cmd.prep_minutes,
                cook_minutes: cmd.cook_minutes,
                servings: cmd.servings,
                difficulty: cmd.difficulty,
                instructions,
                cover_image_url: normalize_optional(cmd.cover_image_url),
                ingredients,
                tags,
            })
            .await?;

        Ok(detail)
    }

    pub async fn update(
        &self,
        actor_id: Uuid,
        id: Uuid,
        cmd: UpdateRecipeCommand,
    ) -> Result<RecipeDetail, RecipeError> {
        let existing = self
            .repo
            .find_recipe(id)
            .await?
            .ok_or(DomainError::not_found("recipe"))?;
        if existing.author_id != actor_id {
            return Err(DomainError::forbidden("recipe").into());
        }

        let mut params = UpdateRecipeParams {
            id,
            ..UpdateRecipeParams::default()
        };

        if let Some(raw) = cmd.title {
            let title = validate_title(&raw)?;
            if title != existing.title {
                params.slug = Some(self.unique_slug(&title).await?);
            }
            params.title = Some(title);
        }
        if let Some(raw) = cmd.description {
            params.description = Some(validate_description(&raw)?);
        }
        if let Some(value) = cmd.prep_minutes {
            params.prep_minutes = Some(validate_positive("prep_minutes", value)?);
        }
        if let Some(value) = cmd.cook_minutes {
            params.cook_minutes = Some(validate_positive("cook_minutes", value)?);
        }
        if let Some(value) = cmd.servings {
            params.servings = Some(validate_positive("servings", value)?);
        }
        params.difficulty = cmd.difficulty;
        if let Some(steps) = cmd.instructions {
            params.instructions = Some(validate_instructions(steps)?);
        }
        if let Some(url) = cmd.cover_image_url {
            params.cover_image_url = Some(normalize_optional(Some(url)));
        }
        if let Some(items) = cmd.ingredients {
            params.ingredients = Some(validate_ingredients(items)?);
        }
        if let Some(names) = cmd.tags {
            params.tags = Some(normalize_tags(names)?);
        }

        let detail = self.repo.update_recipe(params).await?;
        self.uploads
            .discard_replaced(
                existing.cover_image_url.as_deref(),
                detail.summary.recipe.cover_image_url.as_deref(),
            )
            .await;
        Ok(detail)
    }

    pub async fn delete(&self, actor_id: Uuid, id: Uuid) -> Result<(), RecipeError> {
        let existing = self
            .repo
            .find_recipe(id)
            .await?
            .ok_or(DomainError::not_found("recipe"))?;
        if existing.author_id != actor_id {
            return Err(DomainError::forbidden("recipe").into());
        }
        self.repo.delete_recipe(id).await?;
        if let Some(cover) = existing.cover_image_url.as_deref() {
            self.uploads.discard(cover).await;
        }
        Ok(())
    }

    async fn unique_slug(&self, title: &str) -> Result<String, RecipeError> {
        let repo = self.repo.clone();
        let slug = generate_unique_slug(title, move |candidate| {
            let repo = repo.clone();
            let candidate = candidate.to_string();
            async move { repo.slug_exists(&candidate).await.map(|exists| !exists) }
        })
        .await?;
        Ok(slug)
    }
}

fn validate_length(
    field: &str,
    value: &str,
    (min, max): (usize, usize),
) -> Result<String, DomainError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_title(value: &str) -> Result<String, DomainError> {
    validate_length("title", value, TITLE_LEN)
}

fn validate_description(value: &str) -> Result<String, DomainError> {
    validate_length("description", value, DESCRIPTION_LEN)
}

fn validate_positive(field: &str, value: i32) -> Result<i32, DomainError> {
    if value <= 0 {
        return Err(DomainError::validation(format!("{field} must be positive")));
    }
    Ok(value)
}

fn validate_instructions(steps: Vec<String>) -> Result<Vec<String>, DomainError> {
    let steps: Vec<String> = steps
        .into_iter()
        .map(|step| step.trim().to_string())
        .collect();
    if steps.is_empty() {
        return Err(DomainError::validation("at least one instruction is required"));
    }
    if steps.iter().any(String::is_empty) {
        return Err(DomainError::validation("instructions must not be empty"));
    }
    Ok(steps)
}

fn validate_ingredients(items: Vec<IngredientInput>) -> Result<Vec<IngredientParams>, DomainError> {
    if items.is_empty() {
        return Err(DomainError::validation("at least one ingredient is required"));
    }
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let params = IngredientParams {
                name: item.name.trim().to_string(),
                quantity: item.quantity.trim().to_string(),
                unit: item.unit.trim().to_string(),
            };
            if params.name.is_empty() || params.quantity.is_empty() || params.unit.is_empty() {
                return Err(DomainError::validation(format!(
                    "ingredient {} requires name, quantity and unit",
                    index + 1
                )));
            }
            Ok(params)
        })
        .collect()
}

/// Turn raw tag names into `(name, slug)` pairs, dropping duplicate slugs.
fn normalize_tags(names: Vec<String>) -> Result<Vec<TagParams>, DomainError> {
    let mut seen = HashSet::new();
    let mut tags = Vec::with_capacity(names.len());
    for raw in names {
        let name = raw.trim();
        let slug = derive_slug(name)
            .map_err(|_| DomainError::validation(format!("invalid tag `{raw}`")))?;
        if seen.insert(slug.clone()) {
            tags.push(TagParams {
                name: name.to_string(),
                slug,
            });
        }
    }
    Ok(tags)
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, quantity: &str, unit: &str) -> IngredientInput {
        IngredientInput {
            name: name.to_string(),
            quantity: quantity.to_string(),
            unit: unit.to_string(),
        }
    }

    #[test]
    fn title_length_counts_characters_not_bytes() {
        assert!(validate_title("Pão").is_ok());
        assert!(validate_title("  ab ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn instructions_require_non_blank_steps() {
        assert!(validate_instructions(vec![]).is_err());
        assert!(validate_instructions(vec!["Mix".into(), "  ".into()]).is_err());
        assert_eq!(
            validate_instructions(vec![" Mix ".into()]).expect("valid"),
            vec!["Mix".to_string()]
        );
    }

    #[test]
    fn ingredients_need_every_field() {
        assert!(validate_ingredients(vec![]).is_err());
        let err = validate_ingredients(vec![
            ingredient("Flour", "200", "g"),
            ingredient("Salt", "", "pinch"),
        ])
        .expect_err("missing quantity");
        assert!(err.to_string().contains("ingredient 2"));
    }

    #[test]
    fn tags_are_slugged_and_deduplicated() {
        let tags = normalize_tags(vec![
            "Vegetariano".into(),
            "vegetariano ".into(),
            "Sem Glúten".into(),
        ])
        .expect("tags");
        let slugs: Vec<_> = tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, ["vegetariano", "sem-gluten"]);
        assert!(normalize_tags(vec!["   ".into()]).is_err());
    }

    #[test]
    fn positive_fields_reject_zero() {
        assert!(validate_positive("servings", 0).is_err());
        assert_eq!(validate_positive("servings", 4).expect("valid"), 4);
    }
}
