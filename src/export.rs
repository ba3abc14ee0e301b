//! Export the local catalog as JSON.
//!
//! The output is a pretty-printed array of recipes, the same document
//! `recipes import`, `recipes validate` and `POST /api/recipes/import`
//! accept.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::sqlite_store::SqliteRecipeStore;
use crate::store::RecipeRepository;

/// Serialize every recipe in `store` as a pretty JSON array.
pub async fn export_json(store: &dyn RecipeRepository) -> Result<(String, usize)> {
    let recipes = store.get_all().await?;
    let json = serde_json::to_string_pretty(&recipes)?;
    Ok((json, recipes.len()))
}

/// Export all recipes.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = SqliteRecipeStore::open(config).await?;
    let (json, count) = export_json(&store).await?;
    store.close().await;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} recipes to {}", count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecipeInput;
    use crate::store::InMemoryRecipeStore;
    use crate::validation::{parse_import_document, validate_batch};

    #[tokio::test]
    async fn export_is_accepted_by_import_validation() {
        let store = InMemoryRecipeStore::new();
        store
            .create(RecipeInput {
                title: "Pancakes".to_string(),
                description: "Fluffy".to_string(),
                ingredients: vec!["flour".to_string(), "milk".to_string()],
                instructions: vec!["Mix.".to_string(), "Fry.".to_string()],
                tags: vec!["breakfast".to_string()],
                cuisine: Some("American".to_string()),
            })
            .await
            .unwrap();

        let (json, count) = export_json(&store).await.unwrap();
        assert_eq!(count, 1);

        let records = parse_import_document(json.as_bytes()).unwrap();
        let (valid, errors) = validate_batch(&records);
        assert!(errors.is_empty());
        assert_eq!(valid, store.get_all().await.unwrap());
    }
}
