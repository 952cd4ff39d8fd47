//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A route definition as stored in the `gateway.routes` table.
///
/// `predicates` and `filters` are kept in their serialized JSON form; turning
/// them into something executable is the route builder's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RouteRecord {
    /// Stable, unique identifier of the route.
    pub route_id: String,
    /// Upstream target.
    pub uri: String,
    /// JSON array of predicate specs.
    pub predicates: String,
    /// JSON array of filter specs.
    pub filters: String,
    pub rate_limit_enabled: bool,
    pub rate_limit_replenish_rate: Option<i32>,
    pub rate_limit_burst_capacity: Option<i32>,
    pub encryption_key: Option<String>,
    pub key_resolver_name: Option<String>,
    pub enabled: bool,
    pub created_by: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl RouteRecord {
    /// An enabled route with no predicates, filters, rate limit or key.
    pub fn new(route_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            uri: uri.into(),
            predicates: "[]".to_string(),
            filters: "[]".to_string(),
            rate_limit_enabled: false,
            rate_limit_replenish_rate: None,
            rate_limit_burst_capacity: None,
            encryption_key: None,
            key_resolver_name: None,
            enabled: true,
            created_by: Some("SYSTEM".to_string()),
            created_date: Some(Utc::now()),
            last_modified_by: None,
            last_modified_date: None,
        }
    }

    pub fn with_predicates(mut self, predicates: impl Into<String>) -> Self {
        self.predicates = predicates.into();
        self
    }

    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = filters.into();
        self
    }

    pub fn with_rate_limit(mut self, replenish_rate: i32, burst_capacity: i32, resolver: &str) -> Self {
        self.rate_limit_enabled = true;
        self.rate_limit_replenish_rate = Some(replenish_rate);
        self.rate_limit_burst_capacity = Some(burst_capacity);
        self.key_resolver_name = Some(resolver.to_string());
        self
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A blocked client address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub ip_address: String,
    pub reason: Option<String>,
    pub created_by: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
}

impl BlacklistEntry {
    pub fn new(ip_address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            reason: Some(reason.into()),
            created_by: Some("SYSTEM".to_string()),
            created_date: Some(Utc::now()),
        }
    }
}

/// Snapshot of one completed exchange, written to `gateway.request_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub trace_id: String,
    pub http_method: String,
    pub uri: String,
    pub status_code: u16,
    pub client_ip: String,
    /// JSON object of header name → list of values.
    pub request_headers: String,
    /// JSON object of header name → list of values.
    pub response_headers: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
