//! Route/country-scoped [`SpawnConfig`] cache with a TTL, backed by the
//! Content API. Mirrors the `(value, fetched_at)` tuple cache in
//! `original_source/commuter_simulator/infrastructure/spawn/config_loader.py`,
//! re-expressed with an `Arc`-wrapped immutable snapshot per entry (spec's
//! "snapshots are immutable once published" invariant) guarded by a
//! `tokio::sync::RwLock`, matching the teacher's general
//! `Arc<RwLock<_>>` shared-state idiom.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use transit_domain::{ConfigKey, RouteId, SpawnConfig};

use crate::ctx::Ctx;

pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(300);

/// Source of truth for [`SpawnConfig`] bundles, queried on a cache miss.
/// Separated from [`ConfigLoader`]'s caching behavior so tests can swap in
/// a canned source instead of standing up the Content API.
#[async_trait]
pub trait ConfigSourceTrait: Send + Sync + std::fmt::Debug {
    async fn fetch_spawn_config(&self, ctx: &Ctx, key: &ConfigKey) -> Result<Option<SpawnConfig>>;
}

#[derive(Debug)]
pub struct ContentApiConfigSource {
    client: ClientWithMiddleware,
    content_api_base_url: String,
}

impl ContentApiConfigSource {
    pub fn new(client: ClientWithMiddleware, content_api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            content_api_base_url: content_api_base_url.into(),
        }
    }

    fn filter_query_param(key: &ConfigKey) -> (&'static str, String) {
        match key {
            ConfigKey::Route(RouteId(id)) => ("filters[route_id][$eq]", id.clone()),
            ConfigKey::Country(code) => ("filters[country_code][$eq]", code.clone()),
        }
    }
}

#[async_trait]
impl ConfigSourceTrait for ContentApiConfigSource {
    async fn fetch_spawn_config(&self, _ctx: &Ctx, key: &ConfigKey) -> Result<Option<SpawnConfig>> {
        let (param, value) = Self::filter_query_param(key);
        let url = format!("{}/api/spawn-configs", self.content_api_base_url);

        let response = self
            .client
            .get(&url)
            .query(&[(param, value)])
            .send()
            .await
            .with_context(|| format!("fetching spawn config for {key}"))?;

        let body: crate::content_client::PaginatedResponse<SpawnConfig> = response
            .error_for_status()
            .with_context(|| format!("content api returned an error for spawn config {key}"))?
            .json()
            .await
            .context("decoding spawn config response")?;

        Ok(body.data.into_iter().next())
    }
}

/// Canned responses for tests, grounded on `InMemoryContractBmc`/`InMemoryStatusBmc`.
#[derive(Debug, Default)]
pub struct InMemoryConfigSource {
    configs: HashMap<ConfigKey, SpawnConfig>,
}

impl InMemoryConfigSource {
    pub fn new(configs: HashMap<ConfigKey, SpawnConfig>) -> Self {
        Self { configs }
    }
}

#[async_trait]
impl ConfigSourceTrait for InMemoryConfigSource {
    async fn fetch_spawn_config(&self, _ctx: &Ctx, key: &ConfigKey) -> Result<Option<SpawnConfig>> {
        Ok(self.configs.get(key).cloned())
    }
}

struct CacheEntry {
    config: Arc<SpawnConfig>,
    fetched_at: DateTime<Utc>,
}

/// TTL-caching wrapper around a [`ConfigSourceTrait`]. A miss or an expired
/// entry falls back to [`SpawnConfig::defaults`] rather than erroring, so
/// callers never need to special-case "no config published yet".
#[derive(Clone)]
pub struct ConfigLoader {
    source: Arc<dyn ConfigSourceTrait>,
    ttl: Duration,
    cache: Arc<tokio::sync::RwLock<HashMap<ConfigKey, CacheEntry>>>,
}

impl ConfigLoader {
    pub fn new(source: Arc<dyn ConfigSourceTrait>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    pub fn with_default_ttl(source: Arc<dyn ConfigSourceTrait>) -> Self {
        Self::new(source, DEFAULT_CONFIG_TTL)
    }

    pub async fn get(&self, ctx: &Ctx, key: &ConfigKey) -> Result<Arc<SpawnConfig>> {
        if let Some(entry) = self.cache.read().await.get(key) {
            if Utc::now().signed_duration_since(entry.fetched_at).to_std().unwrap_or(Duration::MAX) < self.ttl {
                return Ok(Arc::clone(&entry.config));
            }
        }

        let fetched = self.source.fetch_spawn_config(ctx, key).await?;
        let config = Arc::new(fetched.unwrap_or_else(SpawnConfig::defaults));

        self.cache.write().await.insert(
            key.clone(),
            CacheEntry {
                config: Arc::clone(&config),
                fetched_at: Utc::now(),
            },
        );

        Ok(config)
    }

    /// Evicts one key, or every key when `key` is `None`.
    pub async fn clear(&self, key: Option<&ConfigKey>) {
        let mut guard = self.cache.write().await;
        match key {
            Some(key) => {
                guard.remove(key);
            }
            None => guard.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_key() -> ConfigKey {
        ConfigKey::Route(RouteId("route-1".into()))
    }

    #[tokio::test]
    async fn miss_falls_back_to_defaults() {
        let source = Arc::new(InMemoryConfigSource::default());
        let loader = ConfigLoader::with_default_ttl(source);

        let config = loader.get(&Ctx::Anonymous, &route_key()).await.unwrap();
        assert_eq!(config.spatial_base, SpawnConfig::defaults().spatial_base);
    }

    #[tokio::test]
    async fn hit_returns_the_published_config() {
        let mut configs = HashMap::new();
        let mut custom = SpawnConfig::defaults();
        custom.spatial_base = 0.05;
        configs.insert(route_key(), custom);

        let source = Arc::new(InMemoryConfigSource::new(configs));
        let loader = ConfigLoader::with_default_ttl(source);

        let config = loader.get(&Ctx::Anonymous, &route_key()).await.unwrap();
        assert_eq!(config.spatial_base, 0.05);
    }

    #[tokio::test]
    async fn clear_evicts_a_single_key() {
        let source = Arc::new(InMemoryConfigSource::default());
        let loader = ConfigLoader::with_default_ttl(source);

        let _ = loader.get(&Ctx::Anonymous, &route_key()).await.unwrap();
        assert!(loader.cache.read().await.contains_key(&route_key()));

        loader.clear(Some(&route_key())).await;
        assert!(!loader.cache.read().await.contains_key(&route_key()));
    }
}
