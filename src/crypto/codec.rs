//! Route body encryption.
//!
//! AES-256-GCM with the key material taken from SHA-256 of the route's textual
//! key. Output is standard base64 of `ciphertext || tag`.
//!
//! # Known weakness
//!
//! The nonce is a fixed all-zero 96-bit block, so every message under the same
//! key reuses it and encryption is deterministic. Clients already depend on
//! this wire format; changing it requires a coordinated rollout.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const FIXED_NONCE: [u8; NONCE_LEN] = [0u8; NONCE_LEN];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,

    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("decryption failed (wrong key or tampered ciphertext)")]
    Decrypt,

    #[error("decrypted payload is not valid UTF-8")]
    Utf8,
}

/// Stateless encrypt/decrypt keyed per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoCodec;

impl CryptoCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` and return base64 text.
    pub fn encrypt(&self, plaintext: &str, key: &str) -> Result<String, CryptoError> {
        let cipher = cipher_for(key);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&FIXED_NONCE), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypt base64 text produced by [`CryptoCodec::encrypt`].
    pub fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::Encoding)?;
        let cipher = cipher_for(key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&FIXED_NONCE), raw.as_slice())
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
    }
}

fn cipher_for(key: &str) -> Aes256Gcm {
    let digest = Sha256::digest(key.as_bytes());
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest))
}
