//! Cache-aside access to the active route set.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheStore;
use crate::config::RouteCacheConfig;
use crate::observability::metrics::{self, CacheOutcome};
use crate::routing::builder::RouteDefinitionBuilder;
use crate::routing::definition::RouteDefinition;
use crate::store::{RouteRepository, StoreError};

/// The active route set could not be produced.
#[derive(Debug, Error)]
pub enum RouteLoadError {
    #[error("failed to load routes from store: {0}")]
    Store(#[from] StoreError),
}

/// Reads the whole active route set from one cache key, falling back to
/// the durable store on a miss.
///
/// Concurrent misses may each query the store and write the cache; the last
/// write wins and every writer stores a complete list.
pub struct RouteStore {
    cache: Arc<dyn CacheStore>,
    repository: Arc<dyn RouteRepository>,
    builder: RouteDefinitionBuilder,
    cache_key: String,
    ttl: Duration,
}

impl RouteStore {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        repository: Arc<dyn RouteRepository>,
        builder: RouteDefinitionBuilder,
        config: &RouteCacheConfig,
    ) -> Self {
        Self {
            cache,
            repository,
            builder,
            cache_key: config.cache_key.clone(),
            ttl: config.cache_ttl(),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub async fn get_active_routes(&self) -> Result<Vec<RouteDefinition>, RouteLoadError> {
        if let Some(routes) = self.read_cached().await {
            metrics::record_route_cache(CacheOutcome::Hit);
            return Ok(routes);
        }
        metrics::record_route_cache(CacheOutcome::Miss);

        let routes = self.load_from_store().await?;
        self.write_cached(&routes).await;
        Ok(routes)
    }

    /// `None` for a miss, an unreachable cache, or a corrupt entry.
    async fn read_cached(&self) -> Option<Vec<RouteDefinition>> {
        let bytes = match self.cache.get(&self.cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %self.cache_key, error = %e, "Route cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<Vec<RouteDefinition>>(&bytes) {
            Ok(routes) => {
                tracing::debug!(count = routes.len(), "Route cache hit");
                Some(routes)
            }
            Err(e) => {
                metrics::record_route_cache(CacheOutcome::Corrupt);
                tracing::error!(key = %self.cache_key, error = %e, "Corrupt route cache entry, deleting");
                if let Err(e) = self.cache.delete(&self.cache_key).await {
                    tracing::warn!(key = %self.cache_key, error = %e, "Failed to delete corrupt route cache entry");
                }
                None
            }
        }
    }

    async fn load_from_store(&self) -> Result<Vec<RouteDefinition>, RouteLoadError> {
        tracing::info!("Loading active routes from store");
        let records = self.repository.list_enabled_routes().await?;
        let total = records.len();

        let routes: Vec<RouteDefinition> = records
            .iter()
            .filter(|record| record.enabled)
            .filter_map(|record| match self.builder.build(record) {
                Ok(def) => Some(def),
                Err(e) => {
                    tracing::error!(route_id = %record.route_id, error = %e, "Skipping invalid route");
                    None
                }
            })
            .collect();

        tracing::info!(loaded = routes.len(), records = total, "Routes loaded from store");
        Ok(routes)
    }

    async fn write_cached(&self, routes: &[RouteDefinition]) {
        let bytes = match serde_json::to_vec(routes) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize route set");
                return;
            }
        };

        if let Err(e) = self.cache.set(&self.cache_key, bytes, self.ttl).await {
            tracing::warn!(key = %self.cache_key, error = %e, "Failed to write route cache");
        }
    }
}
