//! Upstream dispatch.
//!
//! # Responsibilities
//! - Rebuild the request against the route's upstream authority
//! - Propagate request and trace ids
//! - Strip hop-by-hop headers in both directions
//! - Enforce the upstream deadline
//!
//! # Design Decisions
//! - No retries; one attempt per request
//! - The upstream `Host` is set by the client from the target URI

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};
use axum::response::Response;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::filter::{Exchange, REQUEST_ID_HEADER, TRACE_ID_HEADER};
use crate::http::error::GatewayError;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Performs the proxied call between the request and response phases.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, exchange: &mut Exchange) -> Result<Response, GatewayError>;
}

/// Forwards over plain HTTP with a pooled hyper client.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    fn build_request(exchange: &mut Exchange) -> Result<Request<Body>, GatewayError> {
        let uri = upstream_uri(&exchange.route.upstream, &exchange.forward_path, exchange.uri.query())?;

        let mut headers = exchange.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let ctx = &exchange.context;
        headers.insert(REQUEST_ID_HEADER, header_value(&ctx.request_id.to_string())?);
        headers.insert(TRACE_ID_HEADER, header_value(&ctx.trace_id)?);
        headers.append(FORWARDED_FOR_HEADER, header_value(&ctx.client_ip.to_string())?);

        let mut request = Request::new(exchange.take_body());
        *request.method_mut() = exchange.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, exchange: &mut Exchange) -> Result<Response, GatewayError> {
        let request = Self::build_request(exchange)?;
        let target = request.uri().clone();

        tracing::debug!(
            request_id = %exchange.context.request_id,
            route_id = %exchange.route_id(),
            upstream = %target,
            "Forwarding request"
        );

        let response: hyper::Response<hyper::body::Incoming> =
            match tokio::time::timeout(self.timeout, self.client.request(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return Err(GatewayError::Upstream(format!("{target}: {e}")));
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %exchange.context.request_id,
                        upstream = %target,
                        timeout_secs = self.timeout.as_secs(),
                        "Upstream timed out"
                    );
                    return Err(GatewayError::UpstreamTimeout);
                }
            };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// `scheme://authority` of the route plus the forwarded path and query.
pub fn upstream_uri(upstream: &Uri, path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
    let scheme = upstream.scheme_str().unwrap_or("http");
    let authority = upstream
        .authority()
        .ok_or_else(|| GatewayError::Internal(format!("route upstream '{upstream}' has no authority")))?;

    let target = match query {
        Some(query) => format!("{scheme}://{authority}{path}?{query}"),
        None => format!("{scheme}://{authority}{path}"),
    };
    target
        .parse()
        .map_err(|e| GatewayError::BadRequest(format!("cannot build upstream uri: {e}")))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(named.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|_| GatewayError::BadRequest(format!("invalid header value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::exchange_for;
    use axum::http::StatusCode;
    use axum::routing::any;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn spawn_upstream(router: Router) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn exchange_to(addr: std::net::SocketAddr, request: Request<Body>) -> Exchange {
        let mut ex = exchange_for(request, None);
        let route = crate::routing::CompiledRoute::for_tests(
            crate::routing::RouteDefinition {
                id: "route-1".into(),
                uri: format!("http://{addr}"),
                predicates: vec![],
                filters: vec![],
                metadata: Default::default(),
                order: 0,
            },
            vec![],
        );
        ex.route = std::sync::Arc::new(route);
        ex
    }

    #[test]
    fn test_upstream_uri() {
        let upstream: Uri = "http://svc:8080/ignored".parse().unwrap();
        assert_eq!(
            upstream_uri(&upstream, "/users/7", Some("a=1")).unwrap(),
            "http://svc:8080/users/7?a=1"
        );
        assert_eq!(upstream_uri(&upstream, "/", None).unwrap(), "http://svc:8080/");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[tokio::test]
    async fn test_forwards_path_query_and_ids() {
        let addr = spawn_upstream(Router::new().route(
            "/{*path}",
            any(|request: Request<Body>| async move {
                let headers = request.headers();
                format!(
                    "{} {} {} {}",
                    request.method(),
                    request.uri(),
                    headers.get(TRACE_ID_HEADER).map(|v| v.to_str().unwrap()).unwrap_or("-"),
                    headers.get(REQUEST_ID_HEADER).is_some(),
                )
            }),
        ))
        .await;

        let request = Request::builder()
            .method("PUT")
            .uri("/api/items?page=2")
            .header(TRACE_ID_HEADER, "trace-1")
            .body(Body::from("payload"))
            .unwrap();
        let mut ex = exchange_to(addr, request);
        ex.forward_path = "/items".into();

        let response = HttpDispatcher::new(Duration::from_secs(5)).dispatch(&mut ex).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"PUT /items?page=2 trace-1 true");
    }

    #[tokio::test]
    async fn test_connection_refused_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut ex = exchange_to(addr, Request::builder().uri("/x").body(Body::empty()).unwrap());
        let err = HttpDispatcher::new(Duration::from_secs(5)).dispatch(&mut ex).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let addr = spawn_upstream(Router::new().route(
            "/slow",
            any(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;

        let mut ex = exchange_to(addr, Request::builder().uri("/slow").body(Body::empty()).unwrap());
        let err = HttpDispatcher::new(Duration::from_millis(100)).dispatch(&mut ex).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
