//! End-to-end request flow through the gateway.

use serde_json::Value;
use std::time::Duration;

use dynamic_gateway::crypto::CryptoCodec;
use dynamic_gateway::store::{BlacklistEntry, MemoryStore, RouteRecord};

mod common;
use common::{client, eventually, start_gateway, start_mock_backend, start_programmable_backend, test_config, MockResponse};

#[tokio::test]
async fn test_rate_limited_route_default_envelope() {
    let backend = start_mock_backend(MockResponse::json(r#"{"id":42,"name":"ada"}"#)).await;

    let store = MemoryStore::new();
    store.upsert_route(
        RouteRecord::new("users", backend.url())
            .with_predicates(r#"["Path=/users/**"]"#)
            .with_rate_limit(10, 20, "ipKeyResolver"),
    );
    let gw = start_gateway(store, test_config()).await;

    let definitions = gw.gateway.table.definitions();
    assert_eq!(definitions.len(), 1);
    let limiter = definitions[0]
        .filters
        .iter()
        .find(|f| f.name == "RequestRateLimiter")
        .expect("synthesized rate limiter filter");
    assert_eq!(limiter.args.get("replenishRate").map(String::as_str), Some("10"));
    assert_eq!(limiter.args.get("burstCapacity").map(String::as_str), Some("20"));

    let res = client().get(gw.url("/users/42")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["x-ratelimit-burst-capacity"], "20");
    assert_eq!(res.headers()["x-ratelimit-replenish-rate"], "10");
    assert_eq!(res.headers()["content-type"], "application/json");

    let request_id = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["status"], "OK");
    assert_eq!(json["data"]["id"], 42);
    assert_eq!(json["data"]["name"], "ada");
    assert_eq!(json["trace_identity"], request_id.as_str());

    assert_eq!(backend.hits(), 1);
    let forwarded = &backend.requests()[0];
    assert_eq!(forwarded.target, "/users/42");
    assert_eq!(forwarded.header("x-request-id"), Some(request_id.as_str()));
}

#[tokio::test]
async fn test_burst_exhaustion_returns_429() {
    let backend = start_mock_backend(MockResponse::json("{}")).await;

    let store = MemoryStore::new();
    store.upsert_route(
        RouteRecord::new("tight", backend.url())
            .with_predicates(r#"["Path=/tight"]"#)
            .with_rate_limit(1, 2, ""),
    );
    let gw = start_gateway(store, test_config()).await;
    let client = client();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(client.get(gw.url("/tight")).send().await.unwrap().status().as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 429]);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_blacklisted_ip_is_rejected_before_dispatch() {
    let backend = start_mock_backend(MockResponse::json("{}")).await;

    let store = MemoryStore::new();
    store.upsert_route(RouteRecord::new("any", backend.url()).with_predicates(r#"["Path=/**"]"#));
    store.block_ip(BlacklistEntry::new("127.0.0.1", "test"));
    let gw = start_gateway(store.clone(), test_config()).await;

    let res = client().get(gw.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    assert!(res.bytes().await.unwrap().is_empty());
    assert_eq!(backend.hits(), 0);

    // Blocked requests are never audited.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.audit_records().is_empty());
}

#[tokio::test]
async fn test_non_success_responses_pass_through_unchanged() {
    let backend = start_programmable_backend(|req| async move {
        match req.target.as_str() {
            "/status/302" => MockResponse::new(302, None, ""),
            "/status/404" => MockResponse::new(404, Some("application/json"), r#"{"error":"nope"}"#),
            "/status/409" => MockResponse::new(409, Some("text/plain"), "conflict: version 3"),
            _ => MockResponse::new(503, Some("text/html"), "<h1>down</h1>"),
        }
    })
    .await;

    let store = MemoryStore::new();
    store.upsert_route(RouteRecord::new("status", backend.url()).with_predicates(r#"["Path=/status/*"]"#));
    let gw = start_gateway(store, test_config()).await;
    let client = client();

    for (code, body) in [
        (302, ""),
        (404, r#"{"error":"nope"}"#),
        (409, "conflict: version 3"),
        (503, "<h1>down</h1>"),
    ] {
        let res = client.get(gw.url(&format!("/status/{code}"))).send().await.unwrap();
        assert_eq!(res.status().as_u16(), code);
        assert_eq!(&res.bytes().await.unwrap()[..], body.as_bytes(), "status {code}");
    }
}

#[tokio::test]
async fn test_encrypted_route_round_trip() {
    const KEY: &str = "shared-route-key";

    // Echo the decrypted request body back as the payload.
    let backend = start_programmable_backend(|req| async move {
        MockResponse {
            status: 200,
            content_type: Some("application/json"),
            body: req.body,
        }
    })
    .await;

    let store = MemoryStore::new();
    store.upsert_route(
        RouteRecord::new("secure", backend.url())
            .with_predicates(r#"["Path=/secure/**"]"#)
            .with_encryption_key(KEY),
    );
    let gw = start_gateway(store, test_config()).await;

    let codec = CryptoCodec::new();
    let ciphertext = codec.encrypt(r#"{"amount":125}"#, KEY).unwrap();
    let res = client()
        .post(gw.url("/secure/payments"))
        .body(ciphertext)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(backend.requests()[0].body, br#"{"amount":125}"#.to_vec());

    let body = res.text().await.unwrap();
    let envelope: Value = serde_json::from_str(&codec.decrypt(&body, KEY).unwrap()).unwrap();
    assert_eq!(envelope["statusCode"], 200);
    assert_eq!(envelope["data"]["amount"], 125);
}

#[tokio::test]
async fn test_undecryptable_request_is_bad_request() {
    let backend = start_mock_backend(MockResponse::json("{}")).await;

    let store = MemoryStore::new();
    store.upsert_route(
        RouteRecord::new("secure", backend.url())
            .with_predicates(r#"["Path=/secure/**"]"#)
            .with_encryption_key("k"),
    );
    let gw = start_gateway(store, test_config()).await;

    let res = client().post(gw.url("/secure/x")).body("plain text").send().await.unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(backend.hits(), 0);

    let json: Value = res.json().await.unwrap();
    assert_eq!(json["statusCode"], 400);
    assert_eq!(json["path"], "/secure/x");
}

#[tokio::test]
async fn test_compliance_profiles() {
    let backend = start_mock_backend(MockResponse::json(r#"{"ok":true}"#)).await;

    let store = MemoryStore::new();
    store.upsert_route(RouteRecord::new("p", backend.url()).with_predicates(r#"["Path=/p"]"#));
    let gw = start_gateway(store, test_config()).await;
    let client = client();

    let owasp: Value = client
        .get(gw.url("/p"))
        .header("X-Compliance-Profile", "owasp")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(owasp["message"], "Success");
    assert_eq!(owasp["payload"]["ok"], true);
    assert!(owasp["correlationId"].is_string());
    assert!(owasp.get("statusCode").is_none());

    let lti: Value = client
        .get(gw.url("/p"))
        .header("X-Compliance-Profile", "LTI")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(lti["lti_success"], true);
    assert_eq!(lti["lti_message"], "Completed");
    assert_eq!(lti["lti_payload"]["ok"], true);

    let unknown: Value = client
        .get(gw.url("/p"))
        .header("X-Compliance-Profile", "hipaa")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown["statusCode"], 200);
    assert_eq!(unknown["data"]["ok"], true);
}

#[tokio::test]
async fn test_unmatched_path_renders_not_found_envelope() {
    let gw = start_gateway(MemoryStore::new(), test_config()).await;

    let res = client().get(gw.url("/missing/thing")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let request_id = res.headers()["x-request-id"].to_str().unwrap().to_string();

    let json: Value = res.json().await.unwrap();
    assert_eq!(json["statusCode"], 404);
    assert_eq!(json["status"], "NOT_FOUND");
    assert_eq!(json["message"], "The requested resource was not found.");
    assert_eq!(json["path"], "/missing/thing");
    assert_eq!(json["trace_identity"], request_id.as_str());
}

#[tokio::test]
async fn test_unreachable_upstream_renders_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let store = MemoryStore::new();
    store.upsert_route(RouteRecord::new("dead", format!("http://{dead}")).with_predicates(r#"["Path=/dead"]"#));
    let gw = start_gateway(store, test_config()).await;

    let res = client()
        .get(gw.url("/dead"))
        .header("X-Compliance-Profile", "lti")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["lti_success"], false);
    assert!(json["lti_payload"].is_null());
}

#[tokio::test]
async fn test_request_is_audited() {
    let backend = start_mock_backend(MockResponse::json("[]")).await;

    let store = MemoryStore::new();
    store.upsert_route(RouteRecord::new("audit", backend.url()).with_predicates(r#"["Path=/audit"]"#));
    let gw = start_gateway(store.clone(), test_config()).await;

    let res = client()
        .get(gw.url("/audit?page=1"))
        .header("X-Trace-ID", "trace-audit-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    assert!(eventually(Duration::from_secs(5), || async { store.audit_records().len() == 1 }).await);
    let record = &store.audit_records()[0];
    assert_eq!(record.trace_id, "trace-audit-1");
    assert_eq!(record.http_method, "GET");
    assert_eq!(record.uri, "/audit?page=1");
    assert_eq!(record.status_code, 200);
    assert_eq!(record.client_ip, "127.0.0.1");
    assert_eq!(backend.requests()[0].header("x-trace-id"), Some("trace-audit-1"));
}
