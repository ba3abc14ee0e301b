//! SQLite repository tests against a temporary database file.

use chrono::{TimeZone, Utc};
use recipe_explorer::config::Config;
use recipe_explorer::migrate;
use recipe_explorer::models::{Recipe, RecipeInput};
use recipe_explorer::sqlite_store::SqliteRecipeStore;
use recipe_explorer::store::RecipeRepository;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("data").join("recipes.sqlite");
    config
}

fn input(title: &str) -> RecipeInput {
    RecipeInput {
        title: title.to_string(),
        description: "A dish".to_string(),
        ingredients: vec!["1 onion".to_string(), "2 tbsp oil".to_string()],
        instructions: vec!["Chop.".to_string(), "Fry.".to_string()],
        tags: vec!["quick".to_string()],
        cuisine: Some("Thai".to_string()),
    }
}

fn fixed(id: &str, title: &str) -> Recipe {
    let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
    Recipe {
        id: id.to_string(),
        created_at: ts,
        updated_at: ts,
        ..input(title).into_recipe(ts)
    }
}

#[tokio::test]
async fn round_trips_every_field() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRecipeStore::open(&test_config(&tmp)).await.unwrap();

    let created = store.create(input("Pad Thai")).await.unwrap();
    let fetched = store.get(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);

    let mut no_cuisine = input("Plain Rice");
    no_cuisine.cuisine = None;
    no_cuisine.tags = vec![];
    let plain = store.create(no_cuisine).await.unwrap();
    assert_eq!(store.get(&plain.id).await.unwrap().unwrap().cuisine, None);
}

#[tokio::test]
async fn keeps_insertion_order_across_updates() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRecipeStore::open(&test_config(&tmp)).await.unwrap();

    let first = store.create(input("First")).await.unwrap();
    store.create(input("Second")).await.unwrap();
    let updated = store
        .update(&first.id, input("First, revised"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.created_at, first.created_at);

    let titles: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["First, revised", "Second"]);
    assert!(store.update("missing", input("x")).await.unwrap().is_none());
}

#[tokio::test]
async fn search_matches_titles_case_insensitively() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRecipeStore::open(&test_config(&tmp)).await.unwrap();
    store.create(input("Crème Brûlée")).await.unwrap();
    store.create(input("Beef Stew")).await.unwrap();

    let hits = store.search("BRÛLÉE").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Crème Brûlée");
    assert_eq!(store.search("  ").await.unwrap().len(), 2);
    assert!(store.search("tofu").await.unwrap().is_empty());
}

#[tokio::test]
async fn import_replace_swaps_the_catalog() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRecipeStore::open(&test_config(&tmp)).await.unwrap();
    store.create(input("Old")).await.unwrap();

    let batch = vec![fixed("a", "Alpha"), fixed("b", "Beta")];
    assert_eq!(store.import_replace(batch.clone()).await.unwrap(), 2);
    assert_eq!(store.get_all().await.unwrap(), batch);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_import_leaves_catalog_untouched() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteRecipeStore::open(&test_config(&tmp)).await.unwrap();
    store.import_replace(vec![fixed("keep", "Keep me")]).await.unwrap();

    let duplicate_ids = vec![fixed("dup", "One"), fixed("dup", "Two")];
    let err = store.import_replace(duplicate_ids).await.unwrap_err();
    assert!(format!("{:#}", err).contains("dup"));

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "keep");
}

#[tokio::test]
async fn delete_and_persistence_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();

    let store = SqliteRecipeStore::open(&config).await.unwrap();
    let gone = store.create(input("Gone")).await.unwrap();
    let kept = store.create(input("Kept")).await.unwrap();
    assert!(store.delete(&gone.id).await.unwrap());
    assert!(!store.delete(&gone.id).await.unwrap());
    store.close().await;

    let reopened = SqliteRecipeStore::open(&config).await.unwrap();
    let all = reopened.get_all().await.unwrap();
    assert_eq!(all, vec![kept]);
}
