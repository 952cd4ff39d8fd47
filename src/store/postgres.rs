//! PostgreSQL store (schema `gateway`, see `sql/schema.sql`).

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::store::{
    AuditRecord, AuditRepository, BlacklistRepository, RouteRecord, RouteRepository, StoreResult,
};

pub type DbPool = Pool<Postgres>;

/// Repository implementations over a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Database pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteRepository for PgStore {
    async fn list_enabled_routes(&self) -> StoreResult<Vec<RouteRecord>> {
        let routes = sqlx::query_as::<_, RouteRecord>(
            r#"
            SELECT route_id,
                   uri,
                   predicates,
                   filters,
                   rate_limit_enabled,
                   ratelimit_replenish_rate AS rate_limit_replenish_rate,
                   ratelimit_burst_capacity AS rate_limit_burst_capacity,
                   encryption_key,
                   key_resolver_name,
                   enabled,
                   created_by,
                   created_date,
                   last_modified_by,
                   last_modified_date
            FROM gateway.routes
            WHERE enabled = TRUE
            ORDER BY route_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(routes)
    }
}

#[async_trait]
impl BlacklistRepository for PgStore {
    async fn exists_blacklisted(&self, ip: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM gateway.ip_blacklist WHERE ip_address = $1)",
        )
        .bind(ip)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn save_audit_record(&self, record: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO gateway.request_logs
                (request_id, trace_id, http_method, uri, status_code, client_ip,
                 request_headers, response_headers, duration_ms, created_by, created_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'SYSTEM', $10)
            "#,
        )
        .bind(record.request_id.to_string())
        .bind(&record.trace_id)
        .bind(&record.http_method)
        .bind(&record.uri)
        .bind(i32::from(record.status_code))
        .bind(&record.client_ip)
        .bind(&record.request_headers)
        .bind(&record.response_headers)
        .bind(i64::try_from(record.duration_ms).unwrap_or(i64::MAX))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
