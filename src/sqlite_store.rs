//! SQLite-backed [`RecipeRepository`].
//!
//! One row per recipe in the `recipes` table (see [`crate::migrate`]). List
//! fields are stored as JSON text and timestamps as RFC 3339 text. Rows are
//! returned in insertion order (`seq`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Recipe, RecipeInput};
use crate::normalize::format_timestamp;
use crate::store::{title_matches, RecipeRepository};

const SELECT_COLUMNS: &str = "SELECT id, title, description, ingredients_json, instructions_json, \
     tags_json, cuisine, created_at, updated_at FROM recipes";

pub struct SqliteRecipeStore {
    pool: SqlitePool,
}

impl SqliteRecipeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn recipe_from_row(row: &SqliteRow) -> Result<Recipe> {
    let id: String = row.try_get("id")?;
    let decode_list = |column: &str| -> Result<Vec<String>> {
        let raw: String = row.try_get(column)?;
        serde_json::from_str(&raw).with_context(|| format!("Corrupt {} for recipe {}", column, id))
    };
    let decode_ts = |column: &str| -> Result<DateTime<Utc>> {
        let raw: String = row.try_get(column)?;
        let ts = DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("Corrupt {} for recipe {}", column, id))?;
        Ok(ts.with_timezone(&Utc))
    };

    Ok(Recipe {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        ingredients: decode_list("ingredients_json")?,
        instructions: decode_list("instructions_json")?,
        tags: decode_list("tags_json")?,
        cuisine: row.try_get("cuisine")?,
        created_at: decode_ts("created_at")?,
        updated_at: decode_ts("updated_at")?,
        id,
    })
}

async fn insert<'e, E>(executor: E, recipe: &Recipe) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO recipes (id, title, description, ingredients_json, instructions_json, \
         tags_json, cuisine, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&recipe.id)
    .bind(&recipe.title)
    .bind(&recipe.description)
    .bind(serde_json::to_string(&recipe.ingredients)?)
    .bind(serde_json::to_string(&recipe.instructions)?)
    .bind(serde_json::to_string(&recipe.tags)?)
    .bind(&recipe.cuisine)
    .bind(format_timestamp(&recipe.created_at))
    .bind(format_timestamp(&recipe.updated_at))
    .execute(executor)
    .await
    .with_context(|| format!("Failed to insert recipe {}", recipe.id))?;
    Ok(())
}

#[async_trait]
impl RecipeRepository for SqliteRecipeStore {
    async fn get_all(&self) -> Result<Vec<Recipe>> {
        let rows = sqlx::query(&format!("{} ORDER BY seq", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(recipe_from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Recipe>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(recipe_from_row).transpose()
    }

    async fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        // SQLite's lower() is ASCII-only, so matching happens here.
        let all = self.get_all().await?;
        Ok(all
            .into_iter()
            .filter(|r| title_matches(&r.title, query))
            .collect())
    }

    async fn create(&self, input: RecipeInput) -> Result<Recipe> {
        let recipe = input.into_recipe(Utc::now());
        insert(&self.pool, &recipe).await?;
        Ok(recipe)
    }

    async fn update(&self, id: &str, input: RecipeInput) -> Result<Option<Recipe>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };
        let recipe = existing.replaced_with(input, Utc::now());

        sqlx::query(
            "UPDATE recipes SET title = ?, description = ?, ingredients_json = ?, \
             instructions_json = ?, tags_json = ?, cuisine = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(serde_json::to_string(&recipe.ingredients)?)
        .bind(serde_json::to_string(&recipe.instructions)?)
        .bind(serde_json::to_string(&recipe.tags)?)
        .bind(&recipe.cuisine)
        .bind(format_timestamp(&recipe.updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Some(recipe))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn import_replace(&self, recipes: Vec<Recipe>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipes").execute(&mut *tx).await?;
        for recipe in &recipes {
            insert(&mut *tx, recipe).await?;
        }

        tx.commit().await?;
        Ok(recipes.len())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
