//! Request audit trail.
//!
//! # Data Flow
//! ```text
//! RequestLogFilter (response phase)
//!     → AuditLogger::record()  try_send, never waits
//!     → bounded mpsc queue
//!     → worker tasks → AuditRepository::save_audit_record()
//! ```
//!
//! # Design Decisions
//! - DROP-NEW on a full queue: the request path never blocks on the sink
//! - Persistence errors are logged and swallowed
//! - On shutdown each worker drains what is already queued

pub mod logger;

pub use logger::{headers_to_json, AuditLogger};
