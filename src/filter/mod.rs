//! Ordered filter chain around a single upstream dispatch.
//!
//! # Data Flow
//! ```text
//! Exchange
//!     → on_request, ascending order:
//!         blacklist (i32::MIN)      403 abort for blocked IPs
//!         request_log (i32::MIN+1)  ids, audit on the way out
//!         decryption (-10)          buffer + decrypt request body
//!         response (-2)             shaping happens on the way out
//!         route filters (1, 2, ..)  StripPrefix, headers, rate limit
//!     → Dispatcher (upstream call)
//!     → on_response, descending order (lowest order is last, closest
//!       to the client connection)
//! ```
//!
//! # Design Decisions
//! - A filter may answer the request itself (`FilterAction::Respond`); later
//!   filters and dispatch are skipped, earlier ones still see the response
//! - Errors become envelopes through `http::error::render_error` at the
//!   point they occur, then unwind like any other response
//! - Filters hold no per-request state; per-request data lives on `Exchange`

pub mod blacklist;
pub mod body;
pub mod chain;
pub mod decryption;
pub mod exchange;
pub mod request_log;
pub mod response;
pub mod route_filters;

use async_trait::async_trait;
use axum::response::Response;
use std::sync::Arc;

use crate::http::error::GatewayError;

pub use chain::FilterChain;
pub use exchange::{Exchange, RequestContext, REQUEST_ID_HEADER, TRACE_ID_HEADER};

/// What a request-side filter decided.
#[derive(Debug)]
pub enum FilterAction {
    Continue,
    /// Stop here and send this response.
    Respond(Response),
}

#[async_trait]
pub trait GatewayFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs earlier on the request path.
    fn order(&self) -> i32 {
        0
    }

    async fn on_request(&self, _exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        Ok(FilterAction::Continue)
    }

    async fn on_response(
        &self,
        _exchange: &Exchange,
        response: Response,
    ) -> Result<Response, GatewayError> {
        Ok(response)
    }
}

/// A filter paired with the order it runs at in one chain.
#[derive(Clone)]
pub struct OrderedFilter {
    pub order: i32,
    pub filter: Arc<dyn GatewayFilter>,
}

impl OrderedFilter {
    /// Use the filter's own order.
    pub fn new(filter: Arc<dyn GatewayFilter>) -> Self {
        Self {
            order: filter.order(),
            filter,
        }
    }

    pub fn with_order(filter: Arc<dyn GatewayFilter>, order: i32) -> Self {
        Self { order, filter }
    }
}

impl std::fmt::Debug for OrderedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedFilter")
            .field("order", &self.order)
            .field("name", &self.filter.name())
            .finish()
    }
}
