//! Success-response shaping: envelope per compliance profile, then
//! optional encryption.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue};
use axum::response::Response;

use crate::crypto::CryptoCodec;
use crate::filter::body::{self, BufferError, Buffered};
use crate::filter::{Exchange, GatewayFilter};
use crate::http::error::GatewayError;
use crate::transform::EnvelopeContext;

/// Wraps every 2xx body in the client's envelope.
///
/// Non-2xx responses pass through byte for byte. A body that is not JSON,
/// one larger than the shaping limit, or an envelope that fails to
/// serialize is forwarded unmodified. Routes with an encryption key never
/// leak plaintext: for them an oversized body and encryption failures are
/// hard failures.
pub struct ResponseFilter {
    codec: CryptoCodec,
    max_body_bytes: usize,
}

impl ResponseFilter {
    pub fn new(codec: CryptoCodec, max_body_bytes: usize) -> Self {
        Self { codec, max_body_bytes }
    }

    fn declared_length(response: &Response) -> Option<usize> {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn shape(&self, exchange: &Exchange, status: axum::http::StatusCode, raw: &Bytes) -> Option<Vec<u8>> {
        let payload: &serde_json::value::RawValue = match serde_json::from_slice(raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    request_id = %exchange.context.request_id,
                    route_id = %exchange.route_id(),
                    error = %e,
                    "Response body is not JSON, returning original body"
                );
                return None;
            }
        };

        let ctx = EnvelopeContext {
            status,
            path: exchange.path(),
            request_id: exchange.context.request_id,
        };
        match exchange.context.compliance_profile.wrap_success(&ctx, payload) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!(
                    request_id = %exchange.context.request_id,
                    error = %e,
                    "Failed to serialize response envelope, returning original body"
                );
                None
            }
        }
    }
}

#[async_trait]
impl GatewayFilter for ResponseFilter {
    fn name(&self) -> &'static str {
        "ResponseShaping"
    }

    fn order(&self) -> i32 {
        -2
    }

    async fn on_response(&self, exchange: &Exchange, response: Response) -> Result<Response, GatewayError> {
        if !response.status().is_success() {
            return Ok(response);
        }

        let key = exchange.encryption_key();
        if key.is_none() && Self::declared_length(&response).is_some_and(|len| len > self.max_body_bytes) {
            tracing::debug!(
                request_id = %exchange.context.request_id,
                limit = self.max_body_bytes,
                "Response larger than shaping limit, streaming unmodified"
            );
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();
        let raw = match body::buffer_or_replay(body, self.max_body_bytes).await {
            Ok(Buffered::Complete(raw)) => raw,
            Ok(Buffered::Overflow(replay)) => {
                if key.is_some() {
                    return Err(GatewayError::Upstream(format!(
                        "response body exceeds {} bytes",
                        self.max_body_bytes
                    )));
                }
                tracing::debug!(
                    request_id = %exchange.context.request_id,
                    limit = self.max_body_bytes,
                    "Response outgrew shaping limit, streaming unmodified"
                );
                return Ok(Response::from_parts(parts, replay));
            }
            Err(BufferError::Stream(reason)) => return Err(GatewayError::Upstream(reason)),
            Err(e @ BufferError::TooLarge { .. }) => return Err(GatewayError::Upstream(e.to_string())),
        };

        if raw.is_empty() {
            return Ok(Response::from_parts(parts, Body::empty()));
        }

        let Some(envelope) = self.shape(exchange, parts.status, &raw) else {
            return Ok(Response::from_parts(parts, Body::from(raw)));
        };

        let (bytes, content_type) = match key {
            Some(key) => {
                tracing::debug!(route_id = %exchange.route_id(), "Encrypting response body");
                let json = String::from_utf8(envelope)
                    .map_err(|e| GatewayError::Internal(format!("envelope is not UTF-8: {e}")))?;
                let ciphertext = self.codec.encrypt(&json, key)?;
                (ciphertext.into_bytes(), "text/plain")
            }
            None => (envelope, "application/json"),
        };

        parts.headers.remove(header::TRANSFER_ENCODING);
        parts.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}
