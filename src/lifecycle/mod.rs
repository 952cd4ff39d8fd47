//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     config → logging → metrics → backends → initial route load
//!         → background tasks (invalidator, refresher, sweeper, audit workers)
//!         → listeners (gateway, admin)
//!
//! Shutdown (shutdown.rs):
//!     ctrl-c / SIGTERM → Shutdown::trigger()
//!         → listeners stop accepting and drain
//!         → background loops exit, audit workers flush their queue
//! ```
//!
//! # Design Decisions
//! - A failed initial route load is not fatal; the refresher keeps retrying
//! - Every long-running task owns its own broadcast receiver

pub mod shutdown;
pub mod startup;
pub mod sweep;

pub use shutdown::{reap, Shutdown};
pub use startup::{Backends, Gateway, StartupError};
