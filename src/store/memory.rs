//! In-process store.
//!
//! Backs the `memory` backend kind and the test suites. Tracks how many times
//! each read path was hit so cache-aside behaviour can be asserted.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::store::{
    AuditRecord, AuditRepository, BlacklistEntry, BlacklistRepository, RouteRecord,
    RouteRepository, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    routes: DashMap<String, RouteRecord>,
    blacklist: DashMap<String, BlacklistEntry>,
    audit: Mutex<Vec<AuditRecord>>,
    route_queries: AtomicUsize,
    blacklist_queries: AtomicUsize,
    fail_reads: AtomicBool,
}

/// A thread-safe in-memory implementation of every repository trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a route keyed by its `route_id`.
    pub fn upsert_route(&self, record: RouteRecord) {
        self.inner.routes.insert(record.route_id.clone(), record);
    }

    pub fn remove_route(&self, route_id: &str) -> Option<RouteRecord> {
        self.inner.routes.remove(route_id).map(|(_, r)| r)
    }

    pub fn block_ip(&self, entry: BlacklistEntry) {
        self.inner.blacklist.insert(entry.ip_address.clone(), entry);
    }

    pub fn unblock_ip(&self, ip: &str) {
        self.inner.blacklist.remove(ip);
    }

    /// Number of `list_enabled_routes` calls served so far.
    pub fn route_queries(&self) -> usize {
        self.inner.route_queries.load(Ordering::SeqCst)
    }

    /// Number of `exists_blacklisted` calls served so far.
    pub fn blacklist_queries(&self) -> usize {
        self.inner.blacklist_queries.load(Ordering::SeqCst)
    }

    /// Audit rows persisted so far.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        match self.inner.audit.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make every store call fail with `StoreError::Unavailable` (outage simulation).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.fail_reads.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RouteRepository for MemoryStore {
    async fn list_enabled_routes(&self) -> StoreResult<Vec<RouteRecord>> {
        self.inner.route_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut routes: Vec<RouteRecord> = self
            .inner
            .routes
            .iter()
            .filter(|r| r.value().enabled)
            .map(|r| r.value().clone())
            .collect();
        routes.sort_by(|a, b| a.route_id.cmp(&b.route_id));
        Ok(routes)
    }
}

#[async_trait]
impl BlacklistRepository for MemoryStore {
    async fn exists_blacklisted(&self, ip: &str) -> StoreResult<bool> {
        self.inner.blacklist_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.inner.blacklist.contains_key(ip))
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn save_audit_record(&self, record: &AuditRecord) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self
            .inner
            .audit
            .lock()
            .map_err(|_| StoreError::Unavailable("audit buffer poisoned".into()))?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_enabled_routes_listed() {
        let store = MemoryStore::new();
        store.upsert_route(RouteRecord::new("b", "http://b"));
        store.upsert_route(RouteRecord::new("a", "http://a"));
        store.upsert_route(RouteRecord::new("off", "http://off").disabled());

        let routes = store.list_enabled_routes().await.unwrap();
        let ids: Vec<_> = routes.iter().map(|r| r.route_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.route_queries(), 1);
    }

    #[tokio::test]
    async fn test_blacklist_lookup() {
        let store = MemoryStore::new();
        store.block_ip(BlacklistEntry::new("10.0.0.9", "abuse"));

        assert!(store.exists_blacklisted("10.0.0.9").await.unwrap());
        assert!(!store.exists_blacklisted("10.0.0.10").await.unwrap());
        assert_eq!(store.blacklist_queries(), 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_enabled_routes().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
