//! Push-to-invalidate listener for the route cache.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::cache::{CacheStore, PubSub};
use crate::config::RouteCacheConfig;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Deletes the route cache key whenever a message arrives on the
/// invalidation channel. Payloads are ignored.
///
/// After each deletion the `refresh` notifier is signalled so the live
/// route table reloads without waiting for its interval.
pub struct RouteCacheInvalidator {
    pubsub: Arc<dyn PubSub>,
    cache: Arc<dyn CacheStore>,
    channel: String,
    cache_key: String,
    refresh: Arc<Notify>,
}

impl RouteCacheInvalidator {
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        cache: Arc<dyn CacheStore>,
        config: &RouteCacheConfig,
        refresh: Arc<Notify>,
    ) -> Self {
        Self {
            pubsub,
            cache,
            channel: config.invalidation_channel.clone(),
            cache_key: config.cache_key.clone(),
            refresh,
        }
    }

    /// Run until shutdown, resubscribing with backoff if the transport drops.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.pubsub.subscribe(&self.channel).await {
                Ok(mut messages) => {
                    tracing::info!(channel = %self.channel, "Route invalidation listener subscribed");
                    backoff = INITIAL_BACKOFF;

                    loop {
                        tokio::select! {
                            msg = messages.next() => match msg {
                                Some(_) => self.handle_message().await,
                                None => {
                                    tracing::warn!(channel = %self.channel, "Invalidation subscription ended");
                                    break;
                                }
                            },
                            _ = shutdown.recv() => {
                                tracing::info!("Route invalidation listener received shutdown signal");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(channel = %self.channel, error = %e, "Failed to subscribe to invalidation channel");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.recv() => return,
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Clear the cached route set. Failures are logged only; the next
    /// cache-aside read repairs the state.
    pub async fn handle_message(&self) {
        tracing::info!(key = %self.cache_key, "Received invalidation message, clearing route cache");
        match self.cache.delete(&self.cache_key).await {
            Ok(()) => tracing::info!("Route cache cleared"),
            Err(e) => tracing::error!(key = %self.cache_key, error = %e, "Route cache invalidation failed"),
        }
        self.refresh.notify_one();
    }
}
