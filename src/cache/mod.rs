//! Distributed cache and pub/sub subsystem.
//!
//! # Data Flow
//! ```text
//! RouteStore      → get/set/delete  "gateway_routes_v1"
//! SecurityGate    → get/set         "ip_blacklist::{ip}"
//! Invalidator     → subscribe("route-updates") → delete route key
//! Admin API       → publish("route-updates")
//!
//! Implementations:
//!     memory.rs (DashMap + expiry, tokio broadcast for pub/sub)
//!     redis.rs  (ConnectionManager, dedicated pub/sub connection)
//! ```
//!
//! # Design Decisions
//! - Values are opaque bytes; callers own serialization
//! - Every failure is a `CacheError`; callers decide whether it is a miss
//! - Subscriptions are streams so the consumer loop owns its lifetime

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Errors raised by the cache or pub/sub transport.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Stream of raw pub/sub payloads.
pub type MessageStream = BoxStream<'static, Vec<u8>>;

/// Key/value cache with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drop entries whose TTL has passed and return how many went. Stores
    /// that expire keys on their own keep the default.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Publish/subscribe transport.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to `channel`. The stream ends when the transport drops.
    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream>;

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> CacheResult<()>;
}
