//! Filters declared per route.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use std::sync::Arc;
use thiserror::Error;

use crate::filter::{Exchange, FilterAction, GatewayFilter};
use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::routing::builder::{
    ARG_BURST_CAPACITY, ARG_KEY_RESOLVER, ARG_REPLENISH_RATE, RATE_LIMITER_FILTER,
};
use crate::routing::definition::FilterDefinition;
use crate::routing::key_resolver::{self, KeyResolverFn, KeyResolverRegistry, DEFAULT_KEY_RESOLVER};
use crate::security::rate_limit::{RateLimiter, DEFAULT_BURST_CAPACITY, DEFAULT_REPLENISH_RATE};

pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_REPLENISH_HEADER: &str = "x-ratelimit-replenish-rate";
pub const RATE_LIMIT_BURST_HEADER: &str = "x-ratelimit-burst-capacity";

const REMAINING_ATTRIBUTE: &str = "rate_limit.remaining";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterBuildError {
    #[error("unknown filter '{0}'")]
    Unknown(String),

    #[error("filter '{filter}': {reason}")]
    InvalidArgs { filter: String, reason: String },
}

impl FilterBuildError {
    fn invalid(def: &FilterDefinition, reason: impl Into<String>) -> Self {
        FilterBuildError::InvalidArgs {
            filter: def.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Turns filter definitions into runnable filters.
#[derive(Clone)]
pub struct RouteFilterFactory {
    limiter: Arc<dyn RateLimiter>,
    resolvers: Arc<KeyResolverRegistry>,
}

impl RouteFilterFactory {
    pub fn new(limiter: Arc<dyn RateLimiter>, resolvers: Arc<KeyResolverRegistry>) -> Self {
        Self { limiter, resolvers }
    }

    pub fn create(&self, def: &FilterDefinition) -> Result<Arc<dyn GatewayFilter>, FilterBuildError> {
        match def.name.as_str() {
            "StripPrefix" => {
                let parts = def
                    .arg("parts", 0)
                    .ok_or_else(|| FilterBuildError::invalid(def, "missing 'parts'"))?
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FilterBuildError::invalid(def, "'parts' is not a number"))?;
                Ok(Arc::new(StripPrefix { parts }))
            }
            "AddRequestHeader" => {
                let (name, value) = header_args(def)?;
                Ok(Arc::new(AddRequestHeader { name, value }))
            }
            "AddResponseHeader" => {
                let (name, value) = header_args(def)?;
                Ok(Arc::new(AddResponseHeader { name, value }))
            }
            RATE_LIMITER_FILTER => self.rate_limiter(def),
            other => Err(FilterBuildError::Unknown(other.to_string())),
        }
    }

    fn rate_limiter(&self, def: &FilterDefinition) -> Result<Arc<dyn GatewayFilter>, FilterBuildError> {
        let positive = |key: &str, default: u32| {
            def.args
                .get(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        let resolver_name = def
            .args
            .get(ARG_KEY_RESOLVER)
            .map(|v| key_resolver::parse_reference(v))
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_KEY_RESOLVER);

        let resolver = self
            .resolvers
            .get(resolver_name)
            .ok_or_else(|| FilterBuildError::invalid(def, format!("unknown key resolver '{resolver_name}'")))?;

        Ok(Arc::new(RequestRateLimiter {
            replenish_rate: positive(ARG_REPLENISH_RATE, DEFAULT_REPLENISH_RATE),
            burst_capacity: positive(ARG_BURST_CAPACITY, DEFAULT_BURST_CAPACITY),
            resolver,
            limiter: self.limiter.clone(),
        }))
    }
}

fn header_args(def: &FilterDefinition) -> Result<(HeaderName, HeaderValue), FilterBuildError> {
    let name = def
        .arg("name", 0)
        .ok_or_else(|| FilterBuildError::invalid(def, "missing header name"))?;
    let value = def
        .arg("value", 1)
        .ok_or_else(|| FilterBuildError::invalid(def, "missing header value"))?;

    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| FilterBuildError::invalid(def, format!("invalid header name '{name}'")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| FilterBuildError::invalid(def, "invalid header value"))?;
    Ok((name, value))
}

/// Drops the first `parts` path segments before forwarding.
pub struct StripPrefix {
    parts: usize,
}

#[async_trait]
impl GatewayFilter for StripPrefix {
    fn name(&self) -> &'static str {
        "StripPrefix"
    }

    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        let rest: Vec<&str> = exchange
            .forward_path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip(self.parts)
            .collect();

        let mut path = format!("/{}", rest.join("/"));
        if exchange.forward_path.ends_with('/') && !rest.is_empty() {
            path.push('/');
        }
        exchange.forward_path = path;
        Ok(FilterAction::Continue)
    }
}

pub struct AddRequestHeader {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl GatewayFilter for AddRequestHeader {
    fn name(&self) -> &'static str {
        "AddRequestHeader"
    }

    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        exchange.headers.append(self.name.clone(), self.value.clone());
        Ok(FilterAction::Continue)
    }
}

pub struct AddResponseHeader {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl GatewayFilter for AddResponseHeader {
    fn name(&self) -> &'static str {
        "AddResponseHeader"
    }

    async fn on_response(&self, _exchange: &Exchange, mut response: Response) -> Result<Response, GatewayError> {
        response.headers_mut().append(self.name.clone(), self.value.clone());
        Ok(response)
    }
}

/// Token-bucket admission for one route.
pub struct RequestRateLimiter {
    replenish_rate: u32,
    burst_capacity: u32,
    resolver: KeyResolverFn,
    limiter: Arc<dyn RateLimiter>,
}

impl RequestRateLimiter {
    fn apply_headers(&self, response: &mut Response, remaining: u64) {
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
        headers.insert(RATE_LIMIT_REPLENISH_HEADER, HeaderValue::from(self.replenish_rate));
        headers.insert(RATE_LIMIT_BURST_HEADER, HeaderValue::from(self.burst_capacity));
    }
}

#[async_trait]
impl GatewayFilter for RequestRateLimiter {
    fn name(&self) -> &'static str {
        RATE_LIMITER_FILTER
    }

    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        let key = (self.resolver)(exchange);
        let decision = self
            .limiter
            .is_allowed(exchange.route_id(), &key, self.replenish_rate, self.burst_capacity)
            .await;

        if decision.allowed {
            exchange
                .context
                .attributes
                .insert(REMAINING_ATTRIBUTE.to_string(), decision.remaining.to_string());
            return Ok(FilterAction::Continue);
        }

        tracing::warn!(
            request_id = %exchange.context.request_id,
            route_id = %exchange.route_id(),
            key = %key,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(exchange.route_id());

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        self.apply_headers(&mut response, decision.remaining);
        Ok(FilterAction::Respond(response))
    }

    async fn on_response(&self, exchange: &Exchange, mut response: Response) -> Result<Response, GatewayError> {
        if let Some(remaining) = exchange
            .context
            .attributes
            .get(REMAINING_ATTRIBUTE)
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.apply_headers(&mut response, remaining);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support;
    use crate::security::LocalRateLimiter;

    fn factory() -> RouteFilterFactory {
        RouteFilterFactory::new(
            Arc::new(LocalRateLimiter::new()),
            Arc::new(KeyResolverRegistry::with_defaults()),
        )
    }

    fn exchange(path: &str) -> Exchange {
        test_support::exchange(path, None)
    }

    fn def(text: &str) -> FilterDefinition {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_strip_prefix() {
        let filter = factory().create(&def("StripPrefix=1")).unwrap();
        let mut ex = exchange("/api/users/7");
        filter.on_request(&mut ex).await.unwrap();
        assert_eq!(ex.forward_path, "/users/7");

        let filter = factory().create(&def("StripPrefix=5")).unwrap();
        let mut ex = exchange("/api/users");
        filter.on_request(&mut ex).await.unwrap();
        assert_eq!(ex.forward_path, "/");
        assert_eq!(ex.path(), "/api/users");
    }

    #[tokio::test]
    async fn test_header_filters() {
        let req_filter = factory().create(&def("AddRequestHeader=X-Source,gateway")).unwrap();
        let mut ex = exchange("/a");
        req_filter.on_request(&mut ex).await.unwrap();
        assert_eq!(ex.headers["x-source"], "gateway");

        let resp_filter = factory()
            .create(&"AddResponseHeader=X-Served-By,gw".parse().unwrap())
            .unwrap();
        let response = resp_filter
            .on_response(&ex, Response::new(Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-served-by"], "gw");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_rejects_with_headers() {
        let factory = factory();
        let filter_def = FilterDefinition::new(RATE_LIMITER_FILTER)
            .with_arg(ARG_REPLENISH_RATE, "1")
            .with_arg(ARG_BURST_CAPACITY, "1")
            .with_arg(ARG_KEY_RESOLVER, "#{@ipKeyResolver}");
        let filter = factory.create(&filter_def).unwrap();

        let mut first = exchange("/a");
        assert!(matches!(filter.on_request(&mut first).await.unwrap(), FilterAction::Continue));
        let response = filter.on_response(&first, Response::new(Body::empty())).await.unwrap();
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING_HEADER], "0");

        let mut second = exchange("/a");
        match filter.on_request(&mut second).await.unwrap() {
            FilterAction::Respond(response) => {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(response.headers()[RATE_LIMIT_BURST_HEADER], "1");
                assert_eq!(response.headers()[RATE_LIMIT_REPLENISH_HEADER], "1");
            }
            FilterAction::Continue => panic!("second request should be limited"),
        }
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            factory().create(&def("Retry=3")).err(),
            Some(FilterBuildError::Unknown("Retry".into()))
        );
        assert!(matches!(
            factory().create(&def("StripPrefix=abc")),
            Err(FilterBuildError::InvalidArgs { .. })
        ));

        let unknown_resolver = FilterDefinition::new(RATE_LIMITER_FILTER)
            .with_arg(ARG_KEY_RESOLVER, "#{@userKeyResolver}");
        assert!(factory().create(&unknown_resolver).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_defaults() {
        let filter = factory().create(&FilterDefinition::new(RATE_LIMITER_FILTER)).unwrap();
        let mut ex = exchange("/a");
        filter.on_request(&mut ex).await.unwrap();
        let response = filter.on_response(&ex, Response::new(Body::empty())).await.unwrap();
        assert_eq!(response.headers()[RATE_LIMIT_REPLENISH_HEADER], "10");
        assert_eq!(response.headers()[RATE_LIMIT_BURST_HEADER], "20");
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING_HEADER], "19");
    }
}
