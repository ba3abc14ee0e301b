//! Status report for the recipe store, the cache and TheMealDB.
//!
//! Used by `recipes sources` and `GET /api/sources`. The external API is
//! not probed; its row reflects configuration only.

use anyhow::Result;
use serde::Serialize;

use crate::cache::{build_cache, CacheBackend};
use crate::config::Config;

/// One row of the sources report.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub status: String,
    pub healthy: bool,
    pub detail: String,
}

pub async fn get_sources(config: &Config, cache: &dyn CacheBackend) -> Vec<SourceStatus> {
    let db_path = &config.db.path;
    let store = if db_path.exists() {
        ("OK", true)
    } else {
        ("NOT INITIALIZED", false)
    };

    let cache_status = if cache.is_available().await {
        ("OK", true)
    } else if cache.name() == "none" {
        ("DISABLED", false)
    } else {
        ("UNAVAILABLE", false)
    };

    let external = if config.external.enabled {
        ("ENABLED", true)
    } else {
        ("DISABLED", false)
    };

    vec![
        SourceStatus {
            name: "store".to_string(),
            status: store.0.to_string(),
            healthy: store.1,
            detail: db_path.display().to_string(),
        },
        SourceStatus {
            name: "cache".to_string(),
            status: cache_status.0.to_string(),
            healthy: cache_status.1,
            detail: cache.name().to_string(),
        },
        SourceStatus {
            name: "external".to_string(),
            status: external.0.to_string(),
            healthy: external.1,
            detail: config.external.base_url.clone(),
        },
    ]
}

pub async fn list_sources(config: &Config) -> Result<()> {
    let cache = build_cache(&config.cache);
    let sources = get_sources(config, cache.as_ref()).await;

    println!("{:<10} {:<16} {:<8} DETAIL", "SOURCE", "STATUS", "HEALTHY");
    for s in &sources {
        println!("{:<10} {:<16} {:<8} {}", s.name, s.status, s.healthy, s.detail);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, NoOpCache};

    #[tokio::test]
    async fn reports_every_source() {
        let mut config = Config::minimal();
        config.db.path = "/nonexistent/recipes.sqlite".into();
        config.external.enabled = false;

        let rows = get_sources(&config, &NoOpCache).await;
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["store", "cache", "external"]);
        assert_eq!(rows[0].status, "NOT INITIALIZED");
        assert_eq!(rows[1].status, "DISABLED");
        assert_eq!(rows[2].status, "DISABLED");
        assert!(rows.iter().all(|r| !r.healthy));
    }

    #[tokio::test]
    async fn available_cache_is_healthy() {
        let config = Config::minimal();
        let rows = get_sources(&config, &InMemoryCache::new()).await;
        assert_eq!(rows[1].status, "OK");
        assert_eq!(rows[1].detail, "memory");
        assert!(rows[2].healthy);
    }
}
