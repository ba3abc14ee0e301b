//! Storage abstraction for the local recipe catalog.
//!
//! The [`RecipeRepository`] trait is the only contract the HTTP layer and
//! the CLI depend on. Two backends implement it:
//!
//! - [`InMemoryRecipeStore`]: `Vec` behind `std::sync::RwLock`, for tests.
//! - [`SqliteRecipeStore`](crate::sqlite_store::SqliteRecipeStore): the
//!   persistent store used by `recipes serve`.
//!
//! Both keep recipes in insertion order. Writes are last-write-wins. Ids are
//! unique: `import_replace` fails on a batch that repeats one and leaves the
//! catalog as it was.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Recipe, RecipeInput};

/// Abstract recipe storage.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_all`](RecipeRepository::get_all) | Every recipe in insertion order |
/// | [`get`](RecipeRepository::get) | One recipe by id |
/// | [`search`](RecipeRepository::search) | Case-insensitive title substring match |
/// | [`create`](RecipeRepository::create) | Insert a new recipe with a fresh id |
/// | [`update`](RecipeRepository::update) | Full replace of the editable fields |
/// | [`delete`](RecipeRepository::delete) | Remove by id |
/// | [`import_replace`](RecipeRepository::import_replace) | Replace the whole catalog |
#[async_trait]
pub trait RecipeRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Recipe>>;

    async fn get(&self, id: &str) -> Result<Option<Recipe>>;

    /// Recipes whose title contains `query`, ignoring case. A blank query
    /// matches everything.
    async fn search(&self, query: &str) -> Result<Vec<Recipe>>;

    async fn create(&self, input: RecipeInput) -> Result<Recipe>;

    /// Replace every editable field. Keeps `created_at`, refreshes
    /// `updated_at`. `None` when the id is unknown.
    async fn update(&self, id: &str, input: RecipeInput) -> Result<Option<Recipe>>;

    /// `true` when a recipe was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every recipe and insert `recipes` in order. Returns the new
    /// count.
    async fn import_replace(&self, recipes: Vec<Recipe>) -> Result<usize>;

    async fn count(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }
}

/// Case-insensitive substring match used by every backend.
pub fn title_matches(title: &str, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty() || title.to_lowercase().contains(&query)
}

/// In-memory store for tests.
pub struct InMemoryRecipeStore {
    recipes: RwLock<Vec<Recipe>>,
}

impl InMemoryRecipeStore {
    pub fn new() -> Self {
        Self {
            recipes: RwLock::new(Vec::new()),
        }
    }

    pub fn with_recipes(recipes: Vec<Recipe>) -> Self {
        Self {
            recipes: RwLock::new(recipes),
        }
    }
}

impl Default for InMemoryRecipeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipeRepository for InMemoryRecipeStore {
    async fn get_all(&self) -> Result<Vec<Recipe>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(recipes.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Recipe>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(recipes
            .iter()
            .filter(|r| title_matches(&r.title, query))
            .cloned()
            .collect())
    }

    async fn create(&self, input: RecipeInput) -> Result<Recipe> {
        let recipe = input.into_recipe(Utc::now());
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        recipes.push(recipe.clone());
        Ok(recipe)
    }

    async fn update(&self, id: &str, input: RecipeInput) -> Result<Option<Recipe>> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = recipes.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        *slot = slot.replaced_with(input, Utc::now());
        Ok(Some(slot.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        let before = recipes.len();
        recipes.retain(|r| r.id != id);
        Ok(recipes.len() != before)
    }

    async fn import_replace(&self, new_recipes: Vec<Recipe>) -> Result<usize> {
        let mut ids = HashSet::new();
        if let Some(dup) = new_recipes.iter().find(|r| !ids.insert(r.id.as_str())) {
            anyhow::bail!("Duplicate recipe id in import: {}", dup.id);
        }

        let mut recipes = self.recipes.write().unwrap_or_else(PoisonError::into_inner);
        *recipes = new_recipes;
        Ok(recipes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str) -> RecipeInput {
        RecipeInput {
            title: title.to_string(),
            description: "desc".to_string(),
            ingredients: vec!["salt".to_string()],
            instructions: vec!["stir".to_string()],
            tags: vec![],
            cuisine: None,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryRecipeStore::new();
        let created = store.create(input("Soup")).await.unwrap();
        assert_eq!(created.created_at, created.updated_at);
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let store = InMemoryRecipeStore::new();
        store.create(input("Chicken Soup")).await.unwrap();
        store.create(input("Beef Stew")).await.unwrap();
        let hits = store.search("  SOUP ").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Chicken Soup");
        assert_eq!(store.search("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_keeps_created_at() {
        let store = InMemoryRecipeStore::new();
        let created = store.create(input("Soup")).await.unwrap();
        let mut changed = input("Better Soup");
        changed.tags = vec!["warm".to_string()];
        let updated = store.update(&created.id, changed).await.unwrap().unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Better Soup");
        assert_eq!(updated.tags, vec!["warm"]);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert!(store.update("missing", input("x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() {
        let store = InMemoryRecipeStore::new();
        let created = store.create(input("Soup")).await.unwrap();
        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn import_replaces_everything_in_order() {
        let store = InMemoryRecipeStore::new();
        store.create(input("Old")).await.unwrap();
        let now = Utc::now();
        let batch = vec![input("A").into_recipe(now), input("B").into_recipe(now)];
        assert_eq!(store.import_replace(batch).await.unwrap(), 2);
        let titles: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn import_with_repeated_id_keeps_old_catalog() {
        let now = Utc::now();
        let kept = input("Kept").into_recipe(now);
        let store = InMemoryRecipeStore::with_recipes(vec![kept.clone()]);

        let mut twin = input("Twin").into_recipe(now);
        twin.id = "same".to_string();
        let batch = vec![twin.clone(), twin];
        let err = store.import_replace(batch).await.unwrap_err();
        assert!(err.to_string().contains("same"));
        assert_eq!(store.get_all().await.unwrap(), vec![kept]);
    }
}
