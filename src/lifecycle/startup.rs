//! Ordered startup: backends, route table, background tasks, chain.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::admin::AdminState;
use crate::audit::AuditLogger;
use crate::cache::{CacheError, CacheStore, MemoryCache, PubSub, RedisCache};
use crate::config::{BackendConfig, BackendKind, GatewayConfig};
use crate::crypto::CryptoCodec;
use crate::filter::blacklist::BlacklistFilter;
use crate::filter::decryption::RequestDecryptionFilter;
use crate::filter::request_log::RequestLogFilter;
use crate::filter::response::ResponseFilter;
use crate::filter::route_filters::RouteFilterFactory;
use crate::filter::{FilterChain, GatewayFilter};
use crate::http::{AppState, GatewayServer, HttpDispatcher};
use crate::lifecycle::sweep::{run_sweeper, SWEEP_INTERVAL};
use crate::lifecycle::{reap, Shutdown};
use crate::routing::{
    KeyResolverRegistry, RouteCacheInvalidator, RouteDefinitionBuilder, RouteStore, RouteTable,
};
use crate::security::{LocalRateLimiter, RateLimiter, RedisRateLimiter, SecurityGate};
use crate::store::{
    AuditRepository, BlacklistRepository, MemoryStore, PgStore, RouteRepository, StoreError,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("missing backend setting '{0}'")]
    MissingSetting(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The external collaborators the gateway talks to.
#[derive(Clone)]
pub struct Backends {
    pub routes: Arc<dyn RouteRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub cache: Arc<dyn CacheStore>,
    pub pubsub: Arc<dyn PubSub>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl Backends {
    pub fn memory(store: MemoryStore, cache: MemoryCache) -> Self {
        let store = Arc::new(store);
        let cache = Arc::new(cache);
        Self {
            routes: store.clone(),
            blacklist: store.clone(),
            audit: store,
            cache: cache.clone(),
            pubsub: cache,
            limiter: Arc::new(LocalRateLimiter::new()),
        }
    }

    /// Connect PostgreSQL and Redis for `BackendKind::External`.
    pub async fn connect(config: &BackendConfig) -> Result<Self, StartupError> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or(StartupError::MissingSetting("backend.database_url"))?;
        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or(StartupError::MissingSetting("backend.redis_url"))?;

        let store = Arc::new(PgStore::connect(database_url, config.max_db_connections).await?);
        let cache = RedisCache::connect(redis_url).await?;
        let limiter = Arc::new(RedisRateLimiter::new(cache.connection()));
        let cache = Arc::new(cache);
        Ok(Self {
            routes: store.clone(),
            blacklist: store.clone(),
            audit: store,
            cache: cache.clone(),
            pubsub: cache,
            limiter,
        })
    }

    pub async fn from_config(config: &BackendConfig) -> Result<Self, StartupError> {
        match config.kind {
            BackendKind::Memory => {
                tracing::info!("Using in-memory store and cache");
                Ok(Self::memory(MemoryStore::new(), MemoryCache::new()))
            }
            BackendKind::External => Self::connect(config).await,
        }
    }
}

/// A started gateway: live route table, request state and its tasks.
pub struct Gateway {
    pub table: Arc<RouteTable>,
    pub app: AppState,
    pub admin: AdminState,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Load routes once, spawn the background tasks and assemble the chain.
    ///
    /// A failed initial load is logged; the table starts empty and the
    /// refresher keeps trying.
    pub async fn start(config: &GatewayConfig, backends: Backends, shutdown: &Shutdown) -> Self {
        let resolvers = Arc::new(KeyResolverRegistry::with_defaults());
        tracing::info!(resolvers = ?resolvers.names(), "Key resolvers registered");

        let route_store = Arc::new(RouteStore::new(
            backends.cache.clone(),
            backends.routes.clone(),
            RouteDefinitionBuilder::new(resolvers.clone()),
            &config.routes,
        ));
        let factory = RouteFilterFactory::new(backends.limiter.clone(), resolvers);
        let table = Arc::new(RouteTable::new(route_store, factory));

        match table.refresh().await {
            Ok(count) => tracing::info!(routes = count, "Initial route table loaded"),
            Err(e) => tracing::error!(error = %e, "Initial route load failed, starting with an empty table"),
        }

        let mut tasks = Vec::new();
        let refresh = Arc::new(Notify::new());

        let invalidator = RouteCacheInvalidator::new(
            backends.pubsub.clone(),
            backends.cache.clone(),
            &config.routes,
            refresh.clone(),
        );
        tasks.push(tokio::spawn(invalidator.run(shutdown.subscribe())));
        tasks.push(tokio::spawn(table.clone().run_refresher(
            refresh,
            config.routes.refresh_interval(),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(run_sweeper(
            backends.limiter.clone(),
            backends.cache.clone(),
            SWEEP_INTERVAL,
            shutdown.subscribe(),
        )));

        let (audit, audit_tasks) = AuditLogger::start(backends.audit.clone(), &config.audit, shutdown);
        tasks.extend(audit_tasks);

        let codec = CryptoCodec::new();
        let max_body = config.limits.max_body_bytes;
        let gate = SecurityGate::new(backends.cache.clone(), backends.blacklist.clone(), &config.blacklist);
        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(BlacklistFilter::new(gate)),
            Arc::new(RequestLogFilter::new(audit)),
            Arc::new(RequestDecryptionFilter::new(codec, max_body)),
            Arc::new(ResponseFilter::new(codec, max_body)),
        ];

        let app = AppState {
            table: table.clone(),
            chain: Arc::new(FilterChain::new(filters)),
            dispatcher: Arc::new(HttpDispatcher::new(Duration::from_secs(
                config.limits.upstream_timeout_secs,
            ))),
            request_timeout: Duration::from_secs(config.limits.request_timeout_secs),
        };
        let admin = AdminState {
            table: table.clone(),
            pubsub: backends.pubsub,
            channel: config.routes.invalidation_channel.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
            started_at: Instant::now(),
        };

        Self {
            table,
            app,
            admin,
            tasks,
        }
    }

    pub fn server(&self) -> GatewayServer {
        GatewayServer::new(self.app.clone())
    }

    /// Wait for background tasks after shutdown was triggered.
    pub async fn join(self, deadline: Duration) {
        let pending = self.tasks.len();
        let all = futures_util::future::join_all(self.tasks.into_iter().map(|task| reap("background", task)));
        if tokio::time::timeout(deadline, all).await.is_err() {
            tracing::warn!(pending, "Background tasks did not stop before the deadline");
        }
    }
}
