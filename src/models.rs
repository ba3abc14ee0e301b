//! Core data models used throughout Recipe Explorer.
//!
//! These types represent the local recipes held by the store, the payloads
//! used to create or replace them, and the transient records produced from
//! TheMealDB responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema bounds enforced by the validator.
///
/// Lengths count Unicode scalar values of the trimmed string.
pub mod bounds {
    pub const MAX_TITLE_LENGTH: usize = 200;
    pub const MAX_DESCRIPTION_LENGTH: usize = 2000;
    pub const MAX_INGREDIENTS: usize = 50;
    pub const MAX_INGREDIENT_LENGTH: usize = 200;
    pub const MAX_INSTRUCTIONS: usize = 100;
    pub const MAX_INSTRUCTION_LENGTH: usize = 2000;
    pub const MAX_TAGS: usize = 20;
    pub const MAX_TAG_LENGTH: usize = 50;
    pub const MAX_CUISINE_LENGTH: usize = 50;
}

/// A recipe stored in the local catalog.
///
/// Only ever built by the validator, so every instance satisfies the
/// schema bounds. Ingredients and instructions are never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub tags: Vec<String>,
    pub cuisine: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    /// Full replacement of the editable fields. Keeps `id` and `created_at`.
    pub fn replaced_with(&self, input: RecipeInput, now: DateTime<Utc>) -> Recipe {
        Recipe {
            id: self.id.clone(),
            title: input.title,
            description: input.description,
            ingredients: input.ingredients,
            instructions: input.instructions,
            tags: input.tags,
            cuisine: input.cuisine,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    /// JSON form returned by the API, tagged with `"source": "internal"`.
    pub fn to_response(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("source".to_string(), serde_json::Value::from("internal"));
        }
        value
    }
}

/// Editable recipe fields, used for create and full-replace update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeInput {
    pub title: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub tags: Vec<String>,
    pub cuisine: Option<String>,
}

impl RecipeInput {
    /// Build a new recipe with a fresh UUID.
    pub fn into_recipe(self, now: DateTime<Utc>) -> Recipe {
        Recipe {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title,
            description: self.description,
            ingredients: self.ingredients,
            instructions: self.instructions,
            tags: self.tags,
            cuisine: self.cuisine,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<Recipe> for RecipeInput {
    fn from(recipe: Recipe) -> Self {
        Self {
            title: recipe.title,
            description: recipe.description,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            tags: recipe.tags,
            cuisine: recipe.cuisine,
        }
    }
}

/// A recipe produced from a TheMealDB record.
///
/// Never persisted and never validated against the [`Recipe`] schema; the
/// transform in [`crate::mealdb`] is the only normalization it receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecipe {
    /// `external-<external_id>`.
    pub id: String,
    pub title: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub tags: Vec<String>,
    pub cuisine: Option<String>,
    /// Always `"external"`.
    pub source: String,
    pub image_url: Option<String>,
    pub external_id: String,
}
