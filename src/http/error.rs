//! Per-request errors and the global error renderer.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::filter::RequestContext;
use crate::store::StoreError;
use crate::transform::EnvelopeContext;

pub const NOT_FOUND_MESSAGE: &str = "The requested resource was not found.";
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// The error type flowing through the filter chain.
///
/// `Display` output is for logs only; clients see [`GatewayError::client_message`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matched")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden")]
    Forbidden,

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("request exceeded the gateway deadline")]
    RequestTimeout,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamTimeout | GatewayError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Crypto(_) | GatewayError::Store(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::NotFound => NOT_FOUND_MESSAGE,
            GatewayError::BadRequest(_) => "The request could not be processed.",
            GatewayError::Forbidden => "Access denied.",
            GatewayError::PayloadTooLarge { .. } => "The request body is too large.",
            GatewayError::UpstreamTimeout => "The upstream service did not respond in time.",
            GatewayError::RequestTimeout => "The request took too long to complete.",
            GatewayError::Upstream(_) => "The upstream service is unavailable.",
            GatewayError::Crypto(_) | GatewayError::Store(_) | GatewayError::Internal(_) => {
                INTERNAL_ERROR_MESSAGE
            }
        }
    }
}

/// Render `err` as the client's envelope variant.
///
/// 5xx are logged at error level with the internal detail; the body only
/// ever carries the fixed client message.
pub fn render_error(err: &GatewayError, context: &RequestContext, path: &str) -> Response {
    let status = err.status();

    if status.is_server_error() {
        tracing::error!(
            request_id = %context.request_id,
            trace_id = %context.trace_id,
            path = %path,
            error = %err,
            "Request failed"
        );
    } else {
        tracing::warn!(
            request_id = %context.request_id,
            path = %path,
            status = status.as_u16(),
            error = %err,
            "Request rejected"
        );
    }

    let envelope = EnvelopeContext {
        status,
        path,
        request_id: context.request_id,
    };

    match context.compliance_profile.wrap_error(&envelope, err.client_message()) {
        Ok(bytes) => json_response(status, bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error envelope");
            bare_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// A response with only a status line.
pub fn bare_status(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, bytes: Vec<u8>) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}
