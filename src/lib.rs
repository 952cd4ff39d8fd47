//! Dynamic API gateway library.
//!
//! Routes are loaded from a durable store through a cache-aside layer,
//! invalidated over pub/sub, and served through an ordered filter chain
//! (IP blacklist, audit, body decryption, response envelopes and encryption).

pub mod admin;
pub mod audit;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod store;
pub mod transform;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::{Backends, Gateway, Shutdown};
