//! JSON HTTP API.
//!
//! Serves the local catalog merged with TheMealDB results. Every handler
//! receives its collaborators through [`AppState`] and builds its own
//! [`RequestMetrics`], so timings never leak between requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/api/recipes[?search=q]` | Local recipes, plus TheMealDB matches when searching |
//! | `GET`    | `/api/recipes/internal/{id}` | Local recipe |
//! | `GET`    | `/api/recipes/external/{id}` | TheMealDB recipe |
//! | `GET`    | `/api/recipes/{id}` | Local first, then TheMealDB |
//! | `POST`   | `/api/recipes` | Create |
//! | `PUT`    | `/api/recipes/{id}` | Full replace |
//! | `DELETE` | `/api/recipes/{id}` | Delete |
//! | `POST`   | `/api/recipes/import` | Replace the catalog with a JSON array |
//! | `GET`    | `/api/recipes/export` | Catalog as a JSON array |
//! | `GET`    | `/api/metrics` | Timings and cache/API counters |
//! | `GET`    | `/api/sources` | Store, cache and external status |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Recipe not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `validation_failed` (422, with an `errors` list), `internal` (500).

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::cache::{build_cache, CacheBackend};
use crate::config::Config;
use crate::mealdb::{DisabledSource, ExternalRecipeSource, MealDbSource, EXTERNAL_ID_PREFIX};
use crate::metrics::{timed, AggregateMetrics, RequestMetrics, SourceMetrics};
use crate::models::{ExternalRecipe, Recipe, RecipeInput};
use crate::sources::get_sources;
use crate::sqlite_store::SqliteRecipeStore;
use crate::store::RecipeRepository;
use crate::validation::{parse_import_document, validate_batch, validate_input, FieldError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecipeRepository>,
    pub external: Arc<dyn ExternalRecipeSource>,
    pub cache: Arc<dyn CacheBackend>,
    pub source_metrics: Arc<SourceMetrics>,
    pub metrics: Arc<AggregateMetrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn RecipeRepository>,
        external: Arc<dyn ExternalRecipeSource>,
        cache: Arc<dyn CacheBackend>,
        source_metrics: Arc<SourceMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            external,
            cache,
            source_metrics,
            metrics: Arc::new(AggregateMetrics::new()),
        }
    }

    /// Wire the production collaborators: SQLite store, configured cache
    /// and the TheMealDB adapter (or a disabled source).
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteRecipeStore::open(config).await?);
        let cache = build_cache(&config.cache);
        let source_metrics = Arc::new(SourceMetrics::new());

        let external: Arc<dyn ExternalRecipeSource> = if config.external.enabled {
            let upstream = source_metrics.clone();
            Arc::new(
                MealDbSource::from_config(&config.external, cache.clone())?
                    .with_metrics(source_metrics.clone())
                    .with_timing_callback(Arc::new(move |ms| upstream.record_upstream_ms(ms))),
            )
        } else {
            Arc::new(DisabledSource)
        };

        Ok(Self::new(
            config.clone(),
            store,
            external,
            cache,
            source_metrics,
        ))
    }
}

/// Import `path` into `store` when the store holds no recipes.
///
/// Returns the number of imported recipes (0 when the store was not empty).
pub async fn seed_if_empty(store: &dyn RecipeRepository, path: &FsPath) -> Result<usize> {
    if store.count().await? > 0 {
        return Ok(0);
    }

    let content =
        std::fs::read(path).with_context(|| format!("Cannot read seed file: {}", path.display()))?;
    let records = parse_import_document(&content)
        .with_context(|| format!("Invalid seed file: {}", path.display()))?;
    let (valid, errors) = validate_batch(&records);
    if let Some(first) = errors.first() {
        anyhow::bail!(
            "Seed file {} has {} schema errors (first: index {}, {}: {})",
            path.display(),
            errors.len(),
            first.index,
            first.error.location(),
            first.error.msg
        );
    }

    store.import_replace(valid).await
}

/// Build the API router around `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/recipes", get(handle_list).post(handle_create))
        // The import handler enforces `max_import_bytes` itself.
        .route(
            "/api/recipes/import",
            post(handle_import).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/recipes/export", get(handle_export))
        .route("/api/recipes/internal/{id}", get(handle_get_internal))
        .route("/api/recipes/external/{id}", get(handle_get_external))
        .route(
            "/api/recipes/{id}",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/api/metrics", get(handle_metrics))
        .route("/api/sources", get(handle_sources))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, seeds the store from `[server].seed_file`
/// when it is empty, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;

    if let Some(seed) = &config.server.seed_file {
        let count = seed_if_empty(state.store.as_ref(), seed).await?;
        if count > 0 {
            info!(count, path = %seed.display(), "Seeded recipe store");
        }
    }

    let bind_addr = config.server.bind.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "Recipe API listening");
    println!("Recipe API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Value>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    errors: Option<Value>,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            errors: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                errors: self.errors,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{:#}", err), "Request failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal server error")
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found() -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", "Recipe not found")
}

fn validation_failed(errors: Value) -> AppError {
    AppError {
        errors: Some(errors),
        ..AppError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            "Recipe schema validation failed",
        )
    }
}

fn external_json(recipe: &ExternalRecipe) -> Value {
    serde_json::to_value(recipe).unwrap_or(Value::Null)
}

/// Parse a create/update body and run it through the validator.
fn parse_recipe_body(body: &Bytes) -> Result<RecipeInput, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| bad_request(format!("Invalid JSON at line {}: {}", e.line(), e)))?;
    validate_input(&value).map_err(|errors: Vec<FieldError>| {
        validation_failed(serde_json::to_value(errors).unwrap_or(Value::Null))
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/recipes ============

#[derive(Deserialize)]
struct ListParams {
    search: Option<String>,
}

/// Local recipes first, then TheMealDB matches when `search` is non-blank.
async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let mut metrics = RequestMetrics::new();
    let query = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let (local, ms) = timed(async {
        match query {
            Some(q) => state.store.search(q).await,
            None => state.store.get_all().await,
        }
    })
    .await;
    metrics.record_internal(ms);

    let mut recipes: Vec<Value> = local?.iter().map(Recipe::to_response).collect();

    if let Some(q) = query {
        state.metrics.record_search(q);
        let (external, ms) = timed(state.external.search(q)).await;
        metrics.record_external(ms);
        recipes.extend(external.iter().map(external_json));
    }

    state.metrics.record(&metrics);
    Ok(Json(json!({
        "recipes": recipes,
        "metrics": metrics.to_json(),
    })))
}

// ============ GET /api/recipes/{internal,external}/{id} ============

async fn handle_get_internal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut metrics = RequestMetrics::new();
    let (recipe, ms) = timed(state.store.get(&id)).await;
    metrics.record_internal(ms);
    state.metrics.record(&metrics);

    let recipe = recipe?.ok_or_else(not_found)?;
    Ok(Json(recipe.to_response()))
}

async fn handle_get_external(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut metrics = RequestMetrics::new();
    let external_id = id.strip_prefix(EXTERNAL_ID_PREFIX).unwrap_or(&id);
    let (recipe, ms) = timed(state.external.lookup(external_id)).await;
    metrics.record_external(ms);
    state.metrics.record(&metrics);

    let recipe = recipe.ok_or_else(not_found)?;
    Ok(Json(external_json(&recipe)))
}

// ============ GET /api/recipes/{id} ============

/// Local store first; otherwise TheMealDB with any `external-` prefix removed.
async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let mut metrics = RequestMetrics::new();

    let (local, ms) = timed(state.store.get(&id)).await;
    metrics.record_internal(ms);
    if let Some(recipe) = local? {
        state.metrics.record(&metrics);
        return Ok(Json(recipe.to_response()));
    }

    let external_id = id.strip_prefix(EXTERNAL_ID_PREFIX).unwrap_or(&id);
    let (external, ms) = timed(state.external.lookup(external_id)).await;
    metrics.record_external(ms);
    state.metrics.record(&metrics);

    let recipe = external.ok_or_else(not_found)?;
    Ok(Json(external_json(&recipe)))
}

// ============ POST / PUT / DELETE ============

async fn handle_create(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let input = parse_recipe_body(&body)?;
    let recipe = state.store.create(input).await?;
    Ok(Json(recipe.to_response()))
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let input = parse_recipe_body(&body)?;
    let recipe = state.store.update(&id, input).await?.ok_or_else(not_found)?;
    Ok(Json(recipe.to_response()))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete(&id).await? {
        return Err(not_found());
    }
    Ok(Json(json!({
        "message": "Recipe deleted successfully",
        "status": "success",
    })))
}

// ============ Import / export ============

/// Replace the catalog with a JSON array. Nothing is imported unless every
/// record passes validation.
async fn handle_import(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<Value>, AppError> {
    let max = state.config.server.max_import_bytes;
    let body = axum::body::to_bytes(body, max).await.map_err(|_| {
        bad_request(format!("File too large. Maximum size is {} bytes.", max))
    })?;

    let records = parse_import_document(&body).map_err(|e| bad_request(e.to_string()))?;

    let (valid, errors) = validate_batch(&records);
    if !errors.is_empty() {
        return Err(validation_failed(
            serde_json::to_value(&errors).unwrap_or(Value::Null),
        ));
    }

    let count = state.store.import_replace(valid).await?;
    info!(count, "Imported recipes");
    Ok(Json(json!({
        "message": format!("Successfully imported {} recipes", count),
        "count": count,
    })))
}

async fn handle_export(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, AppError> {
    Ok(Json(state.store.get_all().await?))
}

// ============ Status ============

async fn handle_metrics(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "requests": state.metrics.snapshot(),
        "external": state.source_metrics.snapshot(),
        "cache": {
            "backend": state.cache.name(),
            "available": state.cache.is_available().await,
        },
    }))
}

async fn handle_sources(State(state): State<AppState>) -> Json<Value> {
    let sources = get_sources(&state.config, state.cache.as_ref()).await;
    Json(json!({ "sources": sources }))
}
