//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Accept client connections (axum, HTTP/1.1 and HTTP/2)
//! - Create the per-request context
//! - Match the route table and run the filter chain
//! - Enforce the request deadline and contain panics
//! - Stamp `x-request-id` and record request metrics

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{request::Parts, HeaderValue, Request},
    response::Response,
    routing::any,
    Router,
};
use futures_util::FutureExt;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::filter::{Exchange, FilterChain, RequestContext, REQUEST_ID_HEADER};
use crate::http::dispatch::Dispatcher;
use crate::http::error::{render_error, GatewayError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<RouteTable>,
    pub chain: Arc<FilterChain>,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Deadline for producing response headers.
    pub request_timeout: Duration,
}

/// The client-facing listener.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listener starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.graceful())
            .await?;

        tracing::info!("Gateway listener stopped");
        Ok(())
    }
}

async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let context = RequestContext::new(addr.ip(), &parts.headers);
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    // Timeouts and panics both end up as envelopes in the client's profile.
    let handled = AssertUnwindSafe(route_request(&state, context.clone(), parts, body)).catch_unwind();
    let mut response = match tokio::time::timeout(state.request_timeout, handled).await {
        Ok(Ok(response)) => response,
        Ok(Err(panic)) => {
            let reason = format!("request handling panicked: {}", panic_message(panic.as_ref()));
            render_error(&GatewayError::Internal(reason), &context, &path)
        }
        Err(_) => render_error(&GatewayError::RequestTimeout, &context, &path),
    };

    if let Ok(value) = HeaderValue::from_str(&context.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    metrics::record_request(method.as_str(), response.status().as_u16(), context.start);
    response
}

async fn route_request(state: &AppState, context: RequestContext, parts: Parts, body: Body) -> Response {
    match state.table.find(&parts) {
        Some(route) => {
            let exchange = Exchange::new(context, route, parts, body);
            state.chain.execute(exchange, state.dispatcher.as_ref()).await
        }
        None => {
            tracing::debug!(request_id = %context.request_id, path = %parts.uri.path(), "No route matched");
            render_error(&GatewayError::NotFound, &context, parts.uri.path())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
