use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::mealdb::DEFAULT_BASE_URL;

/// Environment variable that overrides `cache.redis_url`.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// JSON array imported on `serve` when the store is empty.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
    #[serde(default = "default_max_import_bytes")]
    pub max_import_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            seed_file: None,
            max_import_bytes: default_max_import_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_import_bytes() -> usize {
    1_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExternalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// `redis`, `memory` or `none`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_cache_backend() -> String {
    "redis".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

impl CacheConfig {
    /// Redis URL after applying the `REDIS_URL` override. `None` when
    /// caching is switched off (`""`, `false`, `none` or `0`).
    pub fn effective_redis_url(&self) -> Option<String> {
        let url = std::env::var(REDIS_URL_ENV).unwrap_or_else(|_| self.redis_url.clone());
        resolve_redis_url(&url)
    }
}

fn resolve_redis_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    match url.to_ascii_lowercase().as_str() {
        "" | "false" | "none" | "0" => None,
        _ => Some(url.to_string()),
    }
}

impl Config {
    /// Configuration for commands that never touch the database or network
    /// through a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/recipes.sqlite"),
            },
            server: ServerConfig::default(),
            external: ExternalConfig::default(),
            cache: CacheConfig {
                backend: "none".to_string(),
                redis_url: String::new(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.external.timeout_secs == 0 {
        anyhow::bail!("external.timeout_secs must be > 0");
    }

    if config.external.base_url.trim().is_empty() {
        anyhow::bail!("external.base_url must not be empty");
    }

    if config.server.max_import_bytes == 0 {
        anyhow::bail!("server.max_import_bytes must be > 0");
    }

    match config.cache.backend.as_str() {
        "redis" | "memory" | "none" => {}
        other => anyhow::bail!(
            "Unknown cache backend: '{}'. Must be redis, memory, or none.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn applies_defaults() {
        let file = write_config("[db]\npath = \"./data/r.sqlite\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.server.max_import_bytes, 1_000_000);
        assert!(config.server.seed_file.is_none());
        assert!(config.external.enabled);
        assert_eq!(config.external.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.external.timeout_secs, 10);
        assert_eq!(config.cache.backend, "redis");
    }

    #[test]
    fn rejects_zero_timeout() {
        let file = write_config("[db]\npath = \"x\"\n[external]\ntimeout_secs = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_unknown_cache_backend() {
        let file = write_config("[db]\npath = \"x\"\n[cache]\nbackend = \"memcached\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("memcached"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/recipes.toml")).is_err());
    }

    #[test]
    fn disabling_values_turn_off_redis() {
        for raw in ["", "false", "None", " 0 "] {
            assert_eq!(resolve_redis_url(raw), None, "{:?}", raw);
        }
        assert_eq!(
            resolve_redis_url(" redis://cache:6379/1 ").as_deref(),
            Some("redis://cache:6379/1")
        );
    }
}
