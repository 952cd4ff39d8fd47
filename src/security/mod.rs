//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → gate.rs (IP blacklist, cache-aside over the store)
//!     → rate_limit.rs (token bucket per route + resolved key)
//!     → Pass to the rest of the filter chain
//! ```
//!
//! # Design Decisions
//! - Fail closed: a blacklist lookup that cannot be answered rejects
//! - Rate limiting is opt-in per route via the synthesized filter
//! - The Redis limiter fails open; the blacklist is the hard gate

pub mod gate;
pub mod rate_limit;

pub use gate::SecurityGate;
pub use rate_limit::{LocalRateLimiter, RateLimitDecision, RateLimiter, RedisRateLimiter};
