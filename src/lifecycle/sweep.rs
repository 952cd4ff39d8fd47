//! Periodic cleanup of in-process state that would otherwise only grow.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::cache::CacheStore;
use crate::security::RateLimiter;

/// How often idle buckets and expired cache entries are dropped.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Evict refilled rate-limit buckets and expired cache entries every
/// `interval` until shutdown.
pub async fn run_sweeper(
    limiter: Arc<dyn RateLimiter>,
    cache: Arc<dyn CacheStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "State sweeper starting");

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => {
                tracing::info!("State sweeper received shutdown signal, exiting loop");
                break;
            }
        }

        let buckets = limiter.evict_idle();
        let entries = cache.purge_expired();
        if buckets > 0 || entries > 0 {
            tracing::debug!(buckets, entries, "Swept idle state");
        }
    }
}
