//! Request logging and audit capture.

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use chrono::Utc;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use uuid::Uuid;

use crate::audit::{headers_to_json, AuditLogger};
use crate::filter::{Exchange, FilterAction, GatewayFilter};
use crate::http::error::GatewayError;
use crate::store::AuditRecord;

const REQUEST_HEADERS_ATTRIBUTE: &str = "audit.request_headers";

/// Runs right after the blacklist gate, so blocked requests are never
/// audited. On the way out it wraps the response body; completion is
/// logged and audited once that body has been fully written or dropped.
pub struct RequestLogFilter {
    audit: AuditLogger,
}

impl RequestLogFilter {
    pub fn new(audit: AuditLogger) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl GatewayFilter for RequestLogFilter {
    fn name(&self) -> &'static str {
        "RequestLogging"
    }

    fn order(&self) -> i32 {
        i32::MIN + 1
    }

    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        tracing::debug!(
            request_id = %exchange.context.request_id,
            trace_id = %exchange.context.trace_id,
            route_id = %exchange.route_id(),
            method = %exchange.method,
            path = %exchange.path(),
            "Request accepted"
        );

        // Captured before route filters rewrite anything.
        if self.audit.is_enabled() {
            exchange.context.attributes.insert(
                REQUEST_HEADERS_ATTRIBUTE.to_string(),
                headers_to_json(&exchange.headers),
            );
        }
        Ok(FilterAction::Continue)
    }

    async fn on_response(&self, exchange: &Exchange, response: Response) -> Result<Response, GatewayError> {
        let ctx = &exchange.context;
        let status = response.status().as_u16();

        let record = self.audit.is_enabled().then(|| AuditRecord {
            request_id: ctx.request_id,
            trace_id: ctx.trace_id.clone(),
            http_method: exchange.method.to_string(),
            uri: exchange.uri.to_string(),
            status_code: status,
            client_ip: ctx.client_ip.to_string(),
            request_headers: ctx
                .attributes
                .get(REQUEST_HEADERS_ATTRIBUTE)
                .cloned()
                .unwrap_or_else(|| "{}".to_string()),
            response_headers: headers_to_json(response.headers()),
            duration_ms: 0,
            created_at: Utc::now(),
        });

        let completion = Completion {
            audit: self.audit.clone(),
            record,
            request_id: ctx.request_id,
            uri: exchange.uri.to_string(),
            status,
            start: ctx.start,
        };

        let (parts, body) = response.into_parts();
        let body = Body::from_stream(Tracked {
            inner: body.into_data_stream(),
            completion: Some(completion),
        });
        Ok(Response::from_parts(parts, body))
    }
}

/// Logs and audits one finished exchange when dropped.
struct Completion {
    audit: AuditLogger,
    record: Option<AuditRecord>,
    request_id: Uuid,
    uri: String,
    status: u16,
    start: Instant,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;

        tracing::info!(
            request_id = %self.request_id,
            uri = %self.uri,
            status = self.status,
            duration_ms,
            "Request completed"
        );

        if let Some(mut record) = self.record.take() {
            record.duration_ms = duration_ms;
            record.created_at = Utc::now();
            self.audit.record(record);
        }
    }
}

/// Response body stream that fires its [`Completion`] at end of stream,
/// or on drop if the client goes away first.
struct Tracked<S> {
    inner: S,
    completion: Option<Completion>,
}

impl<S: Stream + Unpin> Stream for Tracked<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = next {
            self.completion.take();
        }
        next
    }
}
