//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route cache and invalidation settings.
    pub routes: RouteCacheConfig,

    /// IP blacklist cache settings.
    pub blacklist: BlacklistConfig,

    /// Audit log pipeline.
    pub audit: AuditConfig,

    /// Durable store and distributed cache backends.
    pub backend: BackendConfig,

    /// Body and timeout limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteCacheConfig {
    /// Cache key holding the whole active route set.
    pub cache_key: String,

    /// Pub/sub channel signalling that cached routes are stale.
    pub invalidation_channel: String,

    /// TTL of the cached route set in seconds.
    pub cache_ttl_secs: u64,

    /// Interval at which the in-memory route table is reloaded.
    pub refresh_interval_secs: u64,
}

impl RouteCacheConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            cache_key: "gateway_routes_v1".to_string(),
            invalidation_channel: "route-updates".to_string(),
            cache_ttl_secs: 300,
            refresh_interval_secs: 30,
        }
    }
}

/// IP blacklist cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Cache namespace; entries are stored as `{prefix}::{ip}`.
    pub cache_prefix: String,

    /// TTL of a cached lookup result in seconds.
    pub cache_ttl_secs: u64,
}

impl BlacklistConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "ip_blacklist".to_string(),
            cache_ttl_secs: 600,
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Persist request/response metadata.
    pub enabled: bool,

    /// Bounded queue size between the request path and the writers.
    pub queue_capacity: usize,

    /// Number of writer tasks draining the queue.
    pub workers: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            workers: 2,
        }
    }
}

/// Which implementation backs the store and cache traits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store and cache (development, tests).
    Memory,
    /// PostgreSQL + Redis.
    External,
}

/// Backend connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Redis connection URL (e.g., "redis://127.0.0.1:6379").
    pub redis_url: Option<String>,

    /// PostgreSQL connection URL.
    pub database_url: Option<String>,

    /// Maximum pooled database connections.
    pub max_db_connections: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            redis_url: None,
            database_url: None,
            max_db_connections: 10,
        }
    }
}

/// Body size and timeout limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest body a filter will buffer, in bytes.
    pub max_body_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for the upstream call in seconds.
    pub upstream_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 30,
            upstream_timeout_secs: 25,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder key shipped in defaults; rejected by validation when admin is on.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
