//! Symmetric encryption of route bodies.
//!
//! # Data Flow
//! ```text
//! route metadata["encryption_key"]
//!     → filter::decryption (request body, before dispatch)
//!     → filter::response   (shaped response body, after dispatch)
//!     → codec.rs (AES-256-GCM, SHA-256 derived key, base64 text)
//! ```
//!
//! # Design Decisions
//! - An absent key means "no encryption for this route"; the codec itself
//!   always requires a key
//! - Failures are errors, never partially decrypted output

pub mod codec;

pub use codec::{CryptoCodec, CryptoError};
