//! Route loading through the cache, and invalidation over pub/sub.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use dynamic_gateway::cache::{CacheStore, MemoryCache, PubSub};
use dynamic_gateway::config::RouteCacheConfig;
use dynamic_gateway::lifecycle::Shutdown;
use dynamic_gateway::routing::{KeyResolverRegistry, RouteCacheInvalidator, RouteDefinitionBuilder, RouteStore};
use dynamic_gateway::store::{MemoryStore, RouteRecord};

mod common;
use common::{client, eventually, start_gateway, start_mock_backend, test_config, MockResponse};

fn route_store(store: &MemoryStore, cache: &MemoryCache) -> RouteStore {
    RouteStore::new(
        Arc::new(cache.clone()),
        Arc::new(store.clone()),
        RouteDefinitionBuilder::new(Arc::new(KeyResolverRegistry::with_defaults())),
        &RouteCacheConfig::default(),
    )
}

#[tokio::test]
async fn test_cached_read_skips_store() {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();
    for i in 0..5 {
        store.upsert_route(RouteRecord::new(format!("r{i}"), format!("http://svc-{i}:80")));
    }
    let routes = route_store(&store, &cache);

    assert_eq!(routes.get_active_routes().await.unwrap().len(), 5);
    assert_eq!(routes.get_active_routes().await.unwrap().len(), 5);
    assert_eq!(store.route_queries(), 1);
    assert!(cache.contains("gateway_routes_v1"));
}

#[tokio::test]
async fn test_malformed_record_is_isolated() {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();
    store.upsert_route(RouteRecord::new("a", "http://a:1"));
    store.upsert_route(RouteRecord::new("b", "http://b:1").with_filters(r#"["StripPrefix=1"]"#));
    store.upsert_route(RouteRecord::new("c", "http://c:1"));
    store.upsert_route(RouteRecord::new("broken", "http://x:1").with_predicates("[not json"));
    store.upsert_route(RouteRecord::new("off", "http://off:1").disabled());

    let mut ids: Vec<String> = route_store(&store, &cache)
        .get_active_routes()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_invalidation_forces_requery() {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();
    store.upsert_route(RouteRecord::new("a", "http://a:1"));
    let routes = route_store(&store, &cache);
    routes.get_active_routes().await.unwrap();
    assert_eq!(store.route_queries(), 1);

    let shutdown = Shutdown::new();
    let refresh = Arc::new(Notify::new());
    let invalidator = RouteCacheInvalidator::new(
        Arc::new(cache.clone()),
        Arc::new(cache.clone()),
        &RouteCacheConfig::default(),
        refresh.clone(),
    );
    let task = tokio::spawn(invalidator.run(shutdown.subscribe()));

    // Publish until the listener has subscribed and acted.
    let cleared = eventually(Duration::from_secs(5), || {
        let cache = cache.clone();
        async move {
            cache.publish("route-updates", b"changed".to_vec()).await.unwrap();
            !cache.contains("gateway_routes_v1")
        }
    })
    .await;
    assert!(cleared);

    store.upsert_route(RouteRecord::new("b", "http://b:1"));
    assert_eq!(routes.get_active_routes().await.unwrap().len(), 2);
    assert_eq!(store.route_queries(), 2);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_store_outage_is_a_load_failure() {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();
    store.set_unavailable(true);

    assert!(route_store(&store, &cache).get_active_routes().await.is_err());
    assert!(cache.get("gateway_routes_v1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_route_served_after_invalidation() {
    let backend = start_mock_backend(MockResponse::json(r#"{"v":2}"#)).await;
    let gw = start_gateway(MemoryStore::new(), test_config()).await;
    let client = client();

    assert_eq!(client.get(gw.url("/v2/items")).send().await.unwrap().status(), 404);

    gw.store
        .upsert_route(RouteRecord::new("v2", backend.url()).with_predicates(r#"["Path=/v2/**"]"#));

    // Still cached: the table has not changed.
    assert_eq!(client.get(gw.url("/v2/items")).send().await.unwrap().status(), 404);

    let served = eventually(Duration::from_secs(5), || {
        let cache = gw.cache.clone();
        let client = client.clone();
        let url = gw.url("/v2/items");
        async move {
            cache.publish("route-updates", Vec::new()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.get(url).send().await.unwrap().status() == 200
        }
    })
    .await;
    assert!(served);
    assert_eq!(backend.hits(), 1);
}
