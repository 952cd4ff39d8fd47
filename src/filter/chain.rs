//! Chain execution.

use axum::response::Response;
use std::sync::Arc;

use crate::filter::{Exchange, FilterAction, GatewayFilter, OrderedFilter};
use crate::http::dispatch::Dispatcher;
use crate::http::error::{render_error, GatewayError};

/// Global filters, pre-sorted, merged with each route's own filters per run.
#[derive(Clone, Default)]
pub struct FilterChain {
    global: Vec<OrderedFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        let mut global: Vec<OrderedFilter> = filters.into_iter().map(OrderedFilter::new).collect();
        global.sort_by_key(|f| f.order);
        Self { global }
    }

    /// Global and route filters in execution order. Ties keep global
    /// filters first, then declaration order.
    pub fn merged(&self, route_filters: &[OrderedFilter]) -> Vec<OrderedFilter> {
        let mut all: Vec<OrderedFilter> = self
            .global
            .iter()
            .chain(route_filters.iter())
            .cloned()
            .collect();
        all.sort_by_key(|f| f.order);
        all
    }

    /// Run the request through the chain and the dispatcher.
    ///
    /// Only filters whose request phase completed see the response, in
    /// reverse order. An abort or error stops the request phase where it
    /// happens and skips dispatch.
    pub async fn execute(&self, mut exchange: Exchange, dispatcher: &dyn Dispatcher) -> Response {
        let filters = self.merged(&exchange.route.filters);
        let mut entered = 0;
        let mut outcome: Option<Result<Response, GatewayError>> = None;

        for ordered in &filters {
            match ordered.filter.on_request(&mut exchange).await {
                Ok(FilterAction::Continue) => entered += 1,
                Ok(FilterAction::Respond(response)) => {
                    tracing::debug!(
                        request_id = %exchange.context.request_id,
                        filter = ordered.filter.name(),
                        status = response.status().as_u16(),
                        "Filter answered request"
                    );
                    outcome = Some(Ok(response));
                    break;
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    break;
                }
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => dispatcher.dispatch(&mut exchange).await,
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(e) => render_error(&e, &exchange.context, exchange.path()),
        };

        for ordered in filters[..entered].iter().rev() {
            response = match ordered.filter.on_response(&exchange, response).await {
                Ok(response) => response,
                Err(e) => render_error(&e, &exchange.context, exchange.path()),
            };
        }

        response
    }
}
