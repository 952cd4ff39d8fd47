//! Cached IP blacklist lookup.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::config::BlacklistConfig;
use crate::store::{BlacklistRepository, StoreResult};

const BLOCKED: &[u8] = b"1";
const ALLOWED: &[u8] = b"0";

/// Cache-aside blacklist check.
///
/// Both positive and negative answers are cached under `{prefix}::{ip}` for
/// the blacklist TTL. A cache failure never skips the check: the store is
/// asked directly instead.
#[derive(Clone)]
pub struct SecurityGate {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn BlacklistRepository>,
    prefix: String,
    ttl: Duration,
}

impl SecurityGate {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn BlacklistRepository>,
        config: &BlacklistConfig,
    ) -> Self {
        Self {
            cache,
            store,
            prefix: config.cache_prefix.clone(),
            ttl: config.cache_ttl(),
        }
    }

    pub fn cache_key(&self, ip: &str) -> String {
        format!("{}::{}", self.prefix, ip)
    }

    /// Store errors propagate; the caller decides how to fail closed.
    pub async fn is_blocked(&self, ip: &str) -> StoreResult<bool> {
        let key = self.cache_key(ip);

        match self.cache.get(&key).await {
            Ok(Some(value)) if value == BLOCKED => return Ok(true),
            Ok(Some(value)) if value == ALLOWED => return Ok(false),
            Ok(Some(_)) => {
                tracing::warn!(client_ip = %ip, "Unreadable blacklist cache entry, re-checking store");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(client_ip = %ip, error = %e, "Blacklist cache read failed, querying store");
            }
        }

        let blocked = self.store.exists_blacklisted(ip).await?;

        let value = if blocked { BLOCKED } else { ALLOWED };
        if let Err(e) = self.cache.set(&key, value.to_vec(), self.ttl).await {
            tracing::warn!(client_ip = %ip, error = %e, "Failed to cache blacklist result");
        }

        Ok(blocked)
    }
}
