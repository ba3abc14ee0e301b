//! Response cache for TheMealDB lookups.
//!
//! The adapter consults a [`CacheBackend`] before every network call. Three
//! backends share the same interface:
//!
//! | Backend | Available | Storage |
//! |---------|-----------|---------|
//! | [`RedisCache`] | when Redis answers `PING` | Redis `SETEX`, 24h TTL |
//! | [`InMemoryCache`] | always | process-local map with expiry |
//! | [`NoOpCache`] | never | nothing; every read misses |
//!
//! Backend failures are logged and turned into misses or dropped writes;
//! nothing in this module returns an error to the caller.
//!
//! # Keys
//!
//! - search: `mealdb:search:<trimmed, lower-cased query>`
//! - lookup: `mealdb:meal:<trimmed id>`
//!
//! Lookup values are stored as a tagged JSON document (`{"status":"found",
//! "recipe":{..}}` or `{"status":"not_found"}`), so a confirmed absence reads
//! back as [`CachedMeal::NotFound`] and never collides with a real record.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::models::ExternalRecipe;

/// Lifetime of every cache entry.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "mealdb:";
const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REDIS_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long a failed connection attempt keeps the cache unavailable before
/// the next attempt.
const REDIS_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Cache key for a search query.
pub fn search_key(query: &str) -> String {
    format!("{}search:{}", KEY_PREFIX, query.trim().to_lowercase())
}

/// Cache key for a single-meal lookup.
pub fn meal_key(id: &str) -> String {
    format!("{}meal:{}", KEY_PREFIX, id.trim())
}

/// Outcome of a lookup-cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedMeal {
    /// Nothing cached for this id.
    Miss,
    /// A previous lookup confirmed the meal does not exist.
    NotFound,
    Hit(ExternalRecipe),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StoredMeal {
    Found { recipe: ExternalRecipe },
    NotFound,
}

fn encode_meal(value: Option<&ExternalRecipe>) -> serde_json::Result<String> {
    match value {
        Some(recipe) => serde_json::to_string(&StoredMeal::Found {
            recipe: recipe.clone(),
        }),
        None => serde_json::to_string(&StoredMeal::NotFound),
    }
}

fn decode_meal(key: &str, raw: &str) -> CachedMeal {
    match serde_json::from_str::<StoredMeal>(raw) {
        Ok(StoredMeal::Found { recipe }) => CachedMeal::Hit(recipe),
        Ok(StoredMeal::NotFound) => CachedMeal::NotFound,
        Err(e) => {
            debug!(key, error = %e, "Discarding undecodable cached meal");
            CachedMeal::Miss
        }
    }
}

fn decode_search(key: &str, raw: &str) -> Option<Vec<ExternalRecipe>> {
    match serde_json::from_str(raw) {
        Ok(results) => Some(results),
        Err(e) => {
            debug!(key, error = %e, "Discarding undecodable cached search");
            None
        }
    }
}

/// Key/value cache consulted by the TheMealDB adapter.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name for status reports (`"redis"`, `"memory"`, `"none"`).
    fn name(&self) -> &str;

    /// Whether the backend is reachable right now. Never fails.
    async fn is_available(&self) -> bool;

    /// Cached search results, or `None` on a miss.
    async fn get_search(&self, query: &str) -> Option<Vec<ExternalRecipe>>;

    /// Store search results (possibly empty) for [`CACHE_TTL`].
    async fn set_search(&self, query: &str, results: &[ExternalRecipe]);

    async fn get_meal(&self, id: &str) -> CachedMeal;

    /// Store a lookup result. `None` records a confirmed absence.
    async fn set_meal(&self, id: &str, value: Option<&ExternalRecipe>);
}

// ============ Redis ============

/// Redis-backed cache with a lazily established, reused connection.
///
/// The connection is attempted on first use. After a failed attempt the
/// cache reports itself unavailable without touching the network until the
/// retry backoff has passed, so callers never queue behind a dead server.
pub struct RedisCache {
    client: Option<redis::Client>,
    connection: tokio::sync::Mutex<Option<ConnectionManager>>,
    retry_backoff: Duration,
    retry_after: std::sync::Mutex<Option<Instant>>,
}

impl RedisCache {
    pub fn new(url: &str) -> Self {
        let client = match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Invalid Redis URL, caching disabled");
                None
            }
        };
        Self {
            client,
            connection: tokio::sync::Mutex::new(None),
            retry_backoff: REDIS_RETRY_BACKOFF,
            retry_after: std::sync::Mutex::new(None),
        }
    }

    /// Override how long a failed connection attempt is remembered.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn backing_off(&self) -> bool {
        let until = self.retry_after.lock().unwrap_or_else(PoisonError::into_inner);
        until.is_some_and(|t| Instant::now() < t)
    }

    fn start_backoff(&self) {
        let mut until = self.retry_after.lock().unwrap_or_else(PoisonError::into_inner);
        *until = Some(Instant::now() + self.retry_backoff);
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        let client = self.client.as_ref()?;
        if self.backing_off() {
            return None;
        }

        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Some(conn.clone());
        }
        // Another caller may have failed while this one waited for the lock.
        if self.backing_off() {
            return None;
        }

        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(REDIS_CONNECT_TIMEOUT)
            .set_response_timeout(REDIS_RESPONSE_TIMEOUT)
            .set_number_of_retries(1);

        let mut conn = match ConnectionManager::new_with_config(client.clone(), config).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = self.retry_backoff.as_secs(),
                    "Redis unavailable, caching disabled"
                );
                self.start_backoff();
                return None;
            }
        };

        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        if let Err(e) = pong {
            warn!(
                error = %e,
                retry_in_secs = self.retry_backoff.as_secs(),
                "Redis PING failed, caching disabled"
            );
            self.start_backoff();
            return None;
        }

        *slot = Some(conn.clone());
        Some(conn)
    }

    async fn read(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "Cache get failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: String) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value, CACHE_TTL.as_secs())
            .await
        {
            debug!(key, error = %e, "Cache set failed");
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn is_available(&self) -> bool {
        self.connection().await.is_some()
    }

    async fn get_search(&self, query: &str) -> Option<Vec<ExternalRecipe>> {
        let key = search_key(query);
        let raw = self.read(&key).await?;
        decode_search(&key, &raw)
    }

    async fn set_search(&self, query: &str, results: &[ExternalRecipe]) {
        let key = search_key(query);
        match serde_json::to_string(results) {
            Ok(raw) => self.write(&key, raw).await,
            Err(e) => debug!(key, error = %e, "Cache encode failed"),
        }
    }

    async fn get_meal(&self, id: &str) -> CachedMeal {
        let key = meal_key(id);
        match self.read(&key).await {
            Some(raw) => decode_meal(&key, &raw),
            None => CachedMeal::Miss,
        }
    }

    async fn set_meal(&self, id: &str, value: Option<&ExternalRecipe>) {
        let key = meal_key(id);
        match encode_meal(value) {
            Ok(raw) => self.write(&key, raw).await,
            Err(e) => debug!(key, error = %e, "Cache encode failed"),
        }
    }
}

// ============ In-memory ============

/// Process-local cache with per-entry expiry. Used in tests and
/// single-instance deployments without Redis.
pub struct InMemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, String)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|(expires, _)| *expires > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(expires, _)| *expires > Instant::now())
            .map(|(_, value)| value.clone())
    }

    fn write(&self, key: String, value: String) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, (expires, _)| *expires > now);
        entries.insert(key, (now + self.ttl, value));
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn get_search(&self, query: &str) -> Option<Vec<ExternalRecipe>> {
        let key = search_key(query);
        let raw = self.read(&key)?;
        decode_search(&key, &raw)
    }

    async fn set_search(&self, query: &str, results: &[ExternalRecipe]) {
        if let Ok(raw) = serde_json::to_string(results) {
            self.write(search_key(query), raw);
        }
    }

    async fn get_meal(&self, id: &str) -> CachedMeal {
        let key = meal_key(id);
        match self.read(&key) {
            Some(raw) => decode_meal(&key, &raw),
            None => CachedMeal::Miss,
        }
    }

    async fn set_meal(&self, id: &str, value: Option<&ExternalRecipe>) {
        if let Ok(raw) = encode_meal(value) {
            self.write(meal_key(id), raw);
        }
    }
}

// ============ No-op ============

/// Cache that is never available: reads miss, writes are discarded.
pub struct NoOpCache;

#[async_trait]
impl CacheBackend for NoOpCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn get_search(&self, _query: &str) -> Option<Vec<ExternalRecipe>> {
        None
    }

    async fn set_search(&self, _query: &str, _results: &[ExternalRecipe]) {}

    async fn get_meal(&self, _id: &str) -> CachedMeal {
        CachedMeal::Miss
    }

    async fn set_meal(&self, _id: &str, _value: Option<&ExternalRecipe>) {}
}

/// Build the configured cache backend.
pub fn build_cache(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    match config.backend.as_str() {
        "memory" => Arc::new(InMemoryCache::new()),
        "redis" => match config.effective_redis_url() {
            Some(url) => Arc::new(RedisCache::new(&url)),
            None => Arc::new(NoOpCache),
        },
        _ => Arc::new(NoOpCache),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> ExternalRecipe {
        ExternalRecipe {
            id: format!("external-{}", id),
            title: "Sample".to_string(),
            description: "Step".to_string(),
            ingredients: vec!["1 egg".to_string()],
            instructions: vec!["Step".to_string()],
            tags: vec![],
            cuisine: None,
            source: "external".to_string(),
            image_url: None,
            external_id: id.to_string(),
        }
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(search_key("  ChIcKen "), "mealdb:search:chicken");
        assert_eq!(meal_key(" 52772 "), "mealdb:meal:52772");
    }

    #[tokio::test]
    async fn confirmed_absent_round_trips() {
        let cache = InMemoryCache::new();
        cache.set_meal("999", None).await;
        assert_eq!(cache.get_meal("999").await, CachedMeal::NotFound);
        assert_eq!(cache.get_meal("1000").await, CachedMeal::Miss);
    }

    #[tokio::test]
    async fn meal_hit_round_trips() {
        let cache = InMemoryCache::new();
        let recipe = sample("52772");
        cache.set_meal(" 52772", Some(&recipe)).await;
        assert_eq!(cache.get_meal("52772 ").await, CachedMeal::Hit(recipe));
    }

    #[tokio::test]
    async fn empty_search_results_are_cached() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get_search("nothing").await, None);
        cache.set_search("Nothing ", &[]).await;
        assert_eq!(cache.get_search(" nothing").await, Some(vec![]));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::with_ttl(Duration::from_millis(20));
        cache.set_search("soup", &[sample("1")]).await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_search("soup").await, None);
        assert!(cache.is_empty());
    }

    #[test]
    fn stored_recipe_named_like_a_sentinel_is_still_a_hit() {
        let mut recipe = sample("7");
        recipe.title = "__NONE__".to_string();
        let raw = encode_meal(Some(&recipe)).unwrap();
        assert_eq!(decode_meal("k", &raw), CachedMeal::Hit(recipe));
        let absent = encode_meal(None).unwrap();
        assert_eq!(decode_meal("k", &absent), CachedMeal::NotFound);
        assert_eq!(decode_meal("k", "__NONE__"), CachedMeal::Miss);
    }

    #[tokio::test]
    async fn noop_cache_is_unavailable_and_forgets() {
        let cache = NoOpCache;
        assert!(!cache.is_available().await);
        cache.set_meal("1", None).await;
        cache.set_search("q", &[sample("1")]).await;
        assert_eq!(cache.get_meal("1").await, CachedMeal::Miss);
        assert_eq!(cache.get_search("q").await, None);
    }

    #[tokio::test]
    async fn unreachable_redis_degrades_to_unavailable() {
        let cache = RedisCache::new("redis://127.0.0.1:1/0");
        assert!(!cache.is_available().await);
        cache.set_meal("1", None).await;
        assert_eq!(cache.get_meal("1").await, CachedMeal::Miss);
        assert_eq!(cache.get_search("q").await, None);
    }

    #[tokio::test]
    async fn failed_connect_is_remembered_until_backoff_passes() {
        let cache = RedisCache::new("redis://127.0.0.1:1/0");
        assert!(!cache.backing_off());
        assert!(!cache.is_available().await);
        assert!(cache.backing_off());

        // Answered from the backoff window without a new attempt.
        let started = Instant::now();
        assert!(!cache.is_available().await);
        assert!(started.elapsed() < Duration::from_millis(50));

        let cache = RedisCache::new("redis://127.0.0.1:1/0").with_retry_backoff(Duration::ZERO);
        assert!(!cache.is_available().await);
        assert!(!cache.backing_off());
    }

    #[tokio::test]
    async fn invalid_redis_url_degrades_to_unavailable() {
        let cache = RedisCache::new("not a url");
        assert!(!cache.is_available().await);
    }
}
