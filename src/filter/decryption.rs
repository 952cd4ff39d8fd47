//! Request body decryption for routes carrying an encryption key.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue};

use crate::crypto::CryptoCodec;
use crate::filter::body::{self, BufferError};
use crate::filter::{Exchange, FilterAction, GatewayFilter};
use crate::http::error::GatewayError;

pub struct RequestDecryptionFilter {
    codec: CryptoCodec,
    max_body_bytes: usize,
}

impl RequestDecryptionFilter {
    pub fn new(codec: CryptoCodec, max_body_bytes: usize) -> Self {
        Self { codec, max_body_bytes }
    }
}

#[async_trait]
impl GatewayFilter for RequestDecryptionFilter {
    fn name(&self) -> &'static str {
        "RequestDecryption"
    }

    fn order(&self) -> i32 {
        -10
    }

    /// Buffers the whole body, decrypts it and forwards the plaintext with
    /// a fixed length. An empty body stays empty.
    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        let Some(key) = exchange.encryption_key().map(str::to_owned) else {
            return Ok(FilterAction::Continue);
        };

        let raw = body::buffer(exchange.take_body(), self.max_body_bytes)
            .await
            .map_err(|e| match e {
                BufferError::TooLarge { limit } => GatewayError::PayloadTooLarge { limit },
                BufferError::Stream(reason) => GatewayError::BadRequest(reason),
            })?;

        if raw.is_empty() {
            return Ok(FilterAction::Continue);
        }

        let ciphertext = std::str::from_utf8(&raw)
            .map_err(|_| GatewayError::BadRequest("encrypted body is not text".into()))?;

        tracing::debug!(route_id = %exchange.route_id(), "Decrypting request body");
        let plaintext = self
            .codec
            .decrypt(ciphertext.trim(), &key)
            .map_err(|e| GatewayError::BadRequest(format!("request body decryption failed: {e}")))?;

        let headers = &mut exchange.headers;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(plaintext.len()));
        exchange.set_body(Body::from(plaintext));

        Ok(FilterAction::Continue)
    }
}
