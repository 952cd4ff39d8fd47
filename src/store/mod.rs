//! Durable store subsystem.
//!
//! # Data Flow
//! ```text
//! RouteStore (cache miss)        → RouteRepository::list_enabled_routes
//! SecurityGate (cache miss)      → BlacklistRepository::exists_blacklisted
//! AuditLogger worker             → AuditRepository::save_audit_record
//!
//! Implementations:
//!     memory.rs   (in-process, tests and `backend.kind = "memory"`)
//!     postgres.rs (sqlx, schema `gateway`)
//! ```
//!
//! # Design Decisions
//! - The relational store is an external collaborator; the gateway only
//!   depends on these three narrow traits
//! - Errors carry the driver message but are never rendered to clients

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{AuditRecord, BlacklistEntry, RouteRecord};
pub use postgres::PgStore;

/// Errors raised by a durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the connection broke.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The query itself failed.
    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Source of persisted route records.
#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// All records with `enabled = true`.
    async fn list_enabled_routes(&self) -> StoreResult<Vec<RouteRecord>>;
}

/// Lookup of blocked client addresses.
#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    async fn exists_blacklisted(&self, ip: &str) -> StoreResult<bool>;
}

/// Sink for audit rows.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn save_audit_record(&self, record: &AuditRecord) -> StoreResult<()>;
}
