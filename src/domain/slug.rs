//! Utilities for generating deterministic, human-friendly slugs.
//!
//! Recipe titles and tag names are frequently accented (`Pão de Queijo`), so
//! slugification relies on the `slug` crate's transliteration to produce
//! `pao-de-queijo`. Callers provide their own uniqueness predicate to avoid
//! persistence conflicts while keeping slug derivation pure.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors from [`generate_unique_slug`]: derivation failures or a failed uniqueness check.
#[derive(Debug, Error)]
pub enum UniqueSlugError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Produce a slug that does not collide according to the supplied predicate.
///
/// `is_unique` resolves to `true` when the slug is free. Collisions are
/// retried with a monotonic suffix (`-2`, `-3`, …); predicate errors abort.
pub async fn generate_unique_slug<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, UniqueSlugError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).await.map_err(UniqueSlugError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate)
            .await
            .map_err(UniqueSlugError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(UniqueSlugError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    #[test]
    fn derive_slug_transliterates_accents() {
        assert_eq!(derive_slug("Pão de Queijo").expect("slug"), "pao-de-queijo");
        assert_eq!(derive_slug("  Crème Brûlée!  ").expect("slug"), "creme-brulee");
    }

    #[test]
    fn derive_slug_rejects_blank_and_symbol_only_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    fn existing(slugs: &[&str]) -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(slugs.iter().map(|s| s.to_string()).collect()))
    }

    async fn unique_against(
        title: &str,
        taken: Arc<Mutex<Vec<String>>>,
    ) -> Result<String, UniqueSlugError<Infallible>> {
        generate_unique_slug(title, |candidate| {
            let taken = taken.clone();
            let candidate = candidate.to_string();
            async move { Ok::<bool, Infallible>(!taken.lock().await.contains(&candidate)) }
        })
        .await
    }

    #[tokio::test]
    async fn free_base_slug_is_used_as_is() {
        let slug = unique_against("Banana Bread", existing(&[]))
            .await
            .expect("unique slug");
        assert_eq!(slug, "banana-bread");
    }

    #[tokio::test]
    async fn collisions_append_a_counter() {
        let slug = unique_against("Banana Bread", existing(&["banana-bread", "banana-bread-2"]))
            .await
            .expect("unique slug");
        assert_eq!(slug, "banana-bread-3");
    }

    #[tokio::test]
    async fn exhausted_suffixes_are_reported() {
        let result = generate_unique_slug("Example", |_| async {
            Ok::<bool, Infallible>(false)
        })
        .await;
        assert!(matches!(
            result,
            Err(UniqueSlugError::Slug(SlugError::Exhausted { ref base })) if base == "example"
        ));
    }

    #[tokio::test]
    async fn predicate_errors_abort() {
        let result = generate_unique_slug("Example", |_| async {
            Err::<bool, std::io::Error>(std::io::Error::other("db down"))
        })
        .await;
        assert!(matches!(result, Err(UniqueSlugError::Predicate(_))));
    }
}
