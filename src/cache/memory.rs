//! In-process cache and pub/sub.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cache::{CacheError, CacheResult, CacheStore, MessageStream, PubSub};

const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    fail_commands: AtomicBool,
}

/// A thread-safe TTL cache with broadcast-based pub/sub.
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests can advance it.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes without going through a typed writer (corruption tests).
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .entries
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Entries held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Make every command fail with `CacheError::Connection` (outage simulation).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.fail_commands.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.inner.fail_commands.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("memory cache marked unavailable".into()));
        }
        Ok(())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check_available()?;

        let now = Instant::now();
        let value = match self.inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.inner.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.inner.entries.remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.inner.entries.len())
    }
}

#[async_trait]
impl PubSub for MemoryCache {
    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream> {
        self.check_available()?;
        let rx = self.sender(channel).subscribe();
        let stream = receiver_stream(rx);
        Ok(stream)
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()> {
        self.check_available()?;
        // No subscribers is not an error, matching Redis PUBLISH semantics.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }
}

/// Adapt a broadcast receiver into a message stream, skipping over lag.
fn receiver_stream(rx: broadcast::Receiver<Vec<u8>>) -> MessageStream {
    futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(msg) => return Some((msg, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Pub/sub subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_expired_entries() {
        let cache = MemoryCache::new();
        cache.set("short-a", b"1".to_vec(), Duration::from_secs(5)).await.unwrap();
        cache.set("short-b", b"2".to_vec(), Duration::from_secs(5)).await.unwrap();
        cache.set("long", b"3".to_vec(), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));
    }

    #[tokio::test]
    async fn test_pubsub_delivers_in_order() {
        let cache = MemoryCache::new();
        let mut stream = cache.subscribe("route-updates").await.unwrap();

        cache.publish("route-updates", b"one".to_vec()).await.unwrap();
        cache.publish("route-updates", b"two".to_vec()).await.unwrap();
        cache.publish("other", b"ignored".to_vec()).await.unwrap();

        assert_eq!(stream.next().await, Some(b"one".to_vec()));
        assert_eq!(stream.next().await, Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(cache.get("k").await, Err(CacheError::Connection(_))));
    }
}
