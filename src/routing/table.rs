//! The live routing table.
//!
//! # Responsibilities
//! - Compile route definitions into matchers, upstream URIs and filters
//! - Hold the current set as one immutable snapshot behind `ArcSwap`
//! - Reload on invalidation signals and on a fixed interval
//!
//! # Design Decisions
//! - Swapped wholesale; readers never see a half-built table
//! - A failed reload keeps the previous snapshot
//! - First match wins, ordered by route `order`, then id

use arc_swap::ArcSwap;
use axum::http::{request::Parts, Uri};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::filter::route_filters::{FilterBuildError, RouteFilterFactory};
use crate::filter::OrderedFilter;
use crate::observability::metrics;
use crate::routing::definition::RouteDefinition;
use crate::routing::matcher::{compile_predicate, AndMatcher, Matcher};
use crate::routing::route_store::{RouteLoadError, RouteStore};

/// A route ready to serve requests.
#[derive(Debug)]
pub struct CompiledRoute {
    pub definition: RouteDefinition,
    pub upstream: Uri,
    pub filters: Vec<OrderedFilter>,
    matcher: AndMatcher,
}

impl CompiledRoute {
    /// `None` when the route can never be served safely; the reason is logged.
    pub fn compile(definition: RouteDefinition, factory: &RouteFilterFactory) -> Option<Self> {
        let route_id = definition.id.clone();

        let upstream = match definition.uri.parse::<Uri>() {
            Ok(uri) if uri.scheme_str() == Some("http") && uri.authority().is_some() => uri,
            _ => {
                tracing::warn!(route_id = %route_id, uri = %definition.uri, "Skipping route with unusable upstream uri");
                return None;
            }
        };

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::with_capacity(definition.predicates.len());
        for predicate in &definition.predicates {
            match compile_predicate(predicate) {
                Ok(m) => matchers.push(m),
                Err(e) => {
                    tracing::warn!(route_id = %route_id, error = %e, "Skipping route with unsupported predicate");
                    return None;
                }
            }
        }

        let mut filters = Vec::with_capacity(definition.filters.len());
        for (index, def) in definition.filters.iter().enumerate() {
            match factory.create(def) {
                Ok(filter) => filters.push(OrderedFilter::with_order(filter, index as i32 + 1)),
                Err(FilterBuildError::Unknown(name)) => {
                    tracing::warn!(route_id = %route_id, filter = %name, "Ignoring unknown filter");
                }
                Err(e) => {
                    tracing::warn!(route_id = %route_id, error = %e, "Skipping route with invalid filter");
                    return None;
                }
            }
        }

        Some(Self {
            definition,
            upstream,
            filters,
            matcher: AndMatcher::new(matchers),
        })
    }

    pub fn matches(&self, req: &Parts) -> bool {
        self.matcher.matches(req)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(definition: RouteDefinition, filters: Vec<OrderedFilter>) -> Self {
        let upstream = definition.uri.parse().unwrap_or_else(|_| Uri::from_static("http://127.0.0.1:1"));
        Self {
            definition,
            upstream,
            filters,
            matcher: AndMatcher::new(vec![]),
        }
    }
}

type Snapshot = Arc<Vec<Arc<CompiledRoute>>>;

/// Atomically swapped set of compiled routes.
pub struct RouteTable {
    routes: ArcSwap<Vec<Arc<CompiledRoute>>>,
    store: Arc<RouteStore>,
    factory: RouteFilterFactory,
}

impl RouteTable {
    /// Starts empty; call [`RouteTable::refresh`] to load.
    pub fn new(store: Arc<RouteStore>, factory: RouteFilterFactory) -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
            store,
            factory,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.routes.load_full()
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, req: &Parts) -> Option<Arc<CompiledRoute>> {
        self.routes
            .load()
            .iter()
            .find(|route| route.matches(req))
            .cloned()
    }

    /// Definitions of the current snapshot, in match order.
    pub fn definitions(&self) -> Vec<RouteDefinition> {
        self.routes
            .load()
            .iter()
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Load from the route store and swap in the result.
    pub async fn refresh(&self) -> Result<usize, RouteLoadError> {
        let definitions = self.store.get_active_routes().await?;

        let mut compiled: Vec<Arc<CompiledRoute>> = definitions
            .into_iter()
            .filter_map(|def| CompiledRoute::compile(def, &self.factory))
            .map(Arc::new)
            .collect();
        compiled.sort_by(|a, b| {
            a.definition
                .order
                .cmp(&b.definition.order)
                .then_with(|| a.definition.id.cmp(&b.definition.id))
        });

        let count = compiled.len();
        self.routes.store(Arc::new(compiled));
        metrics::record_routes_loaded(count);
        tracing::debug!(routes = count, "Route table swapped");
        Ok(count)
    }

    /// Reload on every signal and every `interval` until shutdown.
    pub async fn run_refresher(
        self: Arc<Self>,
        signal: Arc<Notify>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "Route refresher starting");

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = signal.notified() => {
                    tracing::info!("Route refresh requested");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Route refresher received shutdown signal, exiting loop");
                    break;
                }
            }

            if let Err(e) = self.refresh().await {
                tracing::error!(error = %e, routes = self.len(), "Route reload failed, keeping previous table");
            }
        }
    }
}
