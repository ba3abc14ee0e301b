//! TheMealDB adapter.
//!
//! Queries the public TheMealDB JSON API, turns its flat meal records into
//! [`ExternalRecipe`]s and degrades to an empty result on every failure.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`ExternalRecipeSource::search`] | `GET {base_url}/search.php?s=<query>` |
//! | [`ExternalRecipeSource::lookup`] | `GET {base_url}/lookup.php?i=<id>` |
//!
//! Both answer `{"meals": null | [..]}`. A `null` container means "no
//! matches" and is a successful, cacheable answer; a missing container is a
//! malformed payload.
//!
//! # Failure handling
//!
//! Timeouts, connection errors, non-2xx statuses, invalid JSON and payloads
//! of the wrong shape are classified as [`FetchError`], logged at `warn`
//! and turned into `[]` / `None`. They are never cached. Individual meals
//! that cannot be transformed are skipped with a warning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheBackend, CachedMeal, NoOpCache};
use crate::config::ExternalConfig;
use crate::metrics::{elapsed_ms, notify_timing, Operation, SourceMetrics, TimingCallback};
use crate::models::ExternalRecipe;

pub const DEFAULT_BASE_URL: &str = "https://www.themealdb.com/api/json/v1/1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of every external recipe id.
pub const EXTERNAL_ID_PREFIX: &str = "external-";

const INGREDIENT_SLOTS: usize = 20;
const ELLIPSIS_THRESHOLD: usize = 100;
const NO_INSTRUCTIONS: &str = "No instructions provided.";
const UNTITLED: &str = "Untitled";

/// Why a request to TheMealDB produced no usable payload.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid JSON: {0}")]
    Decode(String),
    #[error("unexpected payload: {0}")]
    Shape(&'static str),
    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Connect(_) => "connect",
            FetchError::Status(_) => "status",
            FetchError::Decode(_) => "decode",
            FetchError::Shape(_) => "shape",
            FetchError::Request(_) => "request",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Why a single meal record was skipped.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("meal record is not an object")]
    NotAnObject,
    #[error("meal record has no idMeal")]
    MissingId,
}

/// A read-only source of recipes that live outside the local store.
///
/// Implementations never fail: every problem is logged and reported as an
/// empty list or `None`.
#[async_trait]
pub trait ExternalRecipeSource: Send + Sync {
    /// Recipes whose name matches `query`. Blank queries return `[]`.
    async fn search(&self, query: &str) -> Vec<ExternalRecipe>;

    /// The recipe with the given upstream id. Blank ids return `None`.
    async fn lookup(&self, id: &str) -> Option<ExternalRecipe>;
}

// ============ TheMealDB ============

/// [`ExternalRecipeSource`] backed by the TheMealDB HTTP API.
pub struct MealDbSource {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<dyn CacheBackend>,
    metrics: Arc<SourceMetrics>,
    on_timing: Option<TimingCallback>,
}

impl MealDbSource {
    /// Create an adapter without caching.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(NoOpCache),
            metrics: Arc::new(SourceMetrics::new()),
            on_timing: None,
        })
    }

    pub fn from_config(config: &ExternalConfig, cache: Arc<dyn CacheBackend>) -> Result<Self> {
        Ok(Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?.with_cache(cache))
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SourceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Observe the wall-clock time of each network round trip. Cache hits
    /// report `0.0`.
    pub fn with_timing_callback(mut self, callback: TimingCallback) -> Self {
        self.on_timing = Some(callback);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// One GET against `endpoint`, returning the `meals` list.
    async fn fetch(&self, endpoint: &str, param: &str, value: &str) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.get(&url).query(&[(param, value)]).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let json: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        match json.get("meals") {
            Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(meals)) => Ok(meals.clone()),
            Some(_) => Err(FetchError::Shape("meals is not a list")),
            None => Err(FetchError::Shape("missing meals field")),
        }
    }

    /// Run [`fetch`](Self::fetch) and feed the timing callback and counters.
    async fn fetch_observed(
        &self,
        op: Operation,
        endpoint: &str,
        param: &str,
        value: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let start = Instant::now();
        let result = self.fetch(endpoint, param, value).await;
        notify_timing(self.on_timing.as_ref(), elapsed_ms(start));
        self.metrics.record_api_call(op, result.is_ok());
        result
    }

    fn cache_hit(&self, op: Operation) {
        self.metrics.record_cache_hit(op);
        notify_timing(self.on_timing.as_ref(), 0.0);
    }
}

#[async_trait]
impl ExternalRecipeSource for MealDbSource {
    async fn search(&self, query: &str) -> Vec<ExternalRecipe> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let use_cache = self.cache.is_available().await;
        if use_cache {
            if let Some(cached) = self.cache.get_search(query).await {
                self.cache_hit(Operation::Search);
                return cached;
            }
            self.metrics.record_cache_miss(Operation::Search);
        }

        let meals = match self
            .fetch_observed(Operation::Search, "search.php", "s", query)
            .await
        {
            Ok(meals) => meals,
            Err(e) => {
                warn!(query, kind = e.kind(), error = %e, "TheMealDB search failed");
                return Vec::new();
            }
        };

        let results = transform_meals(&meals);
        if use_cache {
            self.cache.set_search(query, &results).await;
        }
        results
    }

    async fn lookup(&self, id: &str) -> Option<ExternalRecipe> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }

        let use_cache = self.cache.is_available().await;
        if use_cache {
            match self.cache.get_meal(id).await {
                CachedMeal::Hit(recipe) => {
                    self.cache_hit(Operation::Meal);
                    return Some(recipe);
                }
                CachedMeal::NotFound => {
                    self.cache_hit(Operation::Meal);
                    return None;
                }
                CachedMeal::Miss => self.metrics.record_cache_miss(Operation::Meal),
            }
        }

        let meals = match self
            .fetch_observed(Operation::Meal, "lookup.php", "i", id)
            .await
        {
            Ok(meals) => meals,
            Err(e) => {
                warn!(id, kind = e.kind(), error = %e, "TheMealDB lookup failed");
                return None;
            }
        };

        let found = match meals.first() {
            None => None,
            Some(raw) => match transform_meal(raw) {
                Ok(recipe) => Some(recipe),
                Err(e) => {
                    warn!(id, error = %e, "Skipping untransformable meal");
                    return None;
                }
            },
        };

        if use_cache {
            self.cache.set_meal(id, found.as_ref()).await;
        }
        found
    }
}

// ============ Disabled ============

/// Source used when external lookups are switched off in config.
pub struct DisabledSource;

#[async_trait]
impl ExternalRecipeSource for DisabledSource {
    async fn search(&self, _query: &str) -> Vec<ExternalRecipe> {
        Vec::new()
    }

    async fn lookup(&self, _id: &str) -> Option<ExternalRecipe> {
        None
    }
}

// ============ Transform ============

fn transform_meals(meals: &[Value]) -> Vec<ExternalRecipe> {
    meals
        .iter()
        .filter_map(|raw| match transform_meal(raw) {
            Ok(recipe) => Some(recipe),
            Err(e) => {
                let raw_id = raw.get("idMeal").cloned().unwrap_or(Value::Null);
                warn!(id = %raw_id, error = %e, "Skipping untransformable meal");
                None
            }
        })
        .collect()
}

/// Convert one TheMealDB meal record into an [`ExternalRecipe`].
///
/// Pure and deterministic. Fails only when the record is not an object or
/// carries no `idMeal`.
pub fn transform_meal(raw: &Value) -> Result<ExternalRecipe, TransformError> {
    let meal = raw.as_object().ok_or(TransformError::NotAnObject)?;

    let external_id = text(meal, "idMeal")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(TransformError::MissingId)?;

    let title = non_blank(meal, "strMeal").unwrap_or_else(|| UNTITLED.to_string());
    let instructions = build_instructions(text(meal, "strInstructions").as_deref());
    let description = build_description(&instructions, &title);

    Ok(ExternalRecipe {
        id: format!("{}{}", EXTERNAL_ID_PREFIX, external_id),
        title,
        description,
        ingredients: build_ingredients(meal),
        instructions,
        tags: build_tags(meal),
        cuisine: non_blank(meal, "strArea"),
        source: "external".to_string(),
        image_url: text(meal, "strMealThumb"),
        external_id,
    })
}

/// String form of a scalar field. Numbers are accepted for ids.
fn text(meal: &Map<String, Value>, key: &str) -> Option<String> {
    match meal.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Trimmed field value, `None` when absent or blank.
fn non_blank(meal: &Map<String, Value>, key: &str) -> Option<String> {
    text(meal, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn build_instructions(raw: Option<&str>) -> Vec<String> {
    let raw = raw.unwrap_or("");
    if raw.is_empty() {
        return vec![NO_INSTRUCTIONS.to_string()];
    }

    let steps: Vec<String> = raw
        .replace("\r\n", "\n")
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_step_number)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect();

    if steps.is_empty() {
        vec![raw.to_string()]
    } else {
        steps
    }
}

/// Remove a leading `12.` or `3)` enumeration marker.
fn strip_step_number(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return line;
    }
    match rest.strip_prefix(['.', ')']) {
        Some(step) => step.trim_start(),
        None => line,
    }
}

/// First step, marked with `...` when more steps follow a long first step.
fn build_description(instructions: &[String], title: &str) -> String {
    let first = instructions.first().cloned().unwrap_or_default();
    let description = if instructions.len() > 1 && first.chars().count() > ELLIPSIS_THRESHOLD {
        format!("{}...", first)
    } else {
        first
    };
    if description.is_empty() {
        title.to_string()
    } else {
        description
    }
}

fn build_ingredients(meal: &Map<String, Value>) -> Vec<String> {
    (1..=INGREDIENT_SLOTS)
        .filter_map(|i| {
            let name = non_blank(meal, &format!("strIngredient{}", i))?;
            match non_blank(meal, &format!("strMeasure{}", i)) {
                Some(measure) => Some(format!("{} {}", measure, name)),
                None => Some(name),
            }
        })
        .collect()
}

fn build_tags(meal: &Map<String, Value>) -> Vec<String> {
    let mut tags: Vec<String> = text(meal, "strTags")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if let Some(category) = non_blank(meal, "strCategory") {
        tags.push(category);
    }
    tags
}
