//! Redis-backed cache and pub/sub.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use crate::cache::{CacheResult, CacheStore, MessageStream, PubSub};

/// Redis client with automatic reconnection for commands.
///
/// Pub/sub needs a connection of its own, so each `subscribe` opens one
/// from the stored client.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to a Redis server (`redis://` or `rediss://`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!("Redis connection established");
        Ok(Self { client, conn })
    }

    /// A handle on the shared command connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait]
impl PubSub for RedisCache {
    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        tracing::info!(channel = %channel, "Subscribed to Redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed();
        Ok(stream)
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }
}
