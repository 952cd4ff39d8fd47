//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, TraceLayer, request deadline, panic guard)
//!     → RequestContext (request id, trace id, compliance profile)
//!     → RouteTable::find
//!         → no match: error.rs renders a 404 envelope
//!         → match: FilterChain around dispatch.rs (hyper-util client)
//!     → x-request-id stamped on every response
//! ```
//!
//! # Design Decisions
//! - Unmatched requests never enter the chain
//! - `GatewayError` is the only error type a filter or the dispatcher returns

pub mod dispatch;
pub mod error;
pub mod server;

pub use dispatch::{Dispatcher, HttpDispatcher};
pub use error::{render_error, GatewayError};
pub use server::{AppState, GatewayServer};
