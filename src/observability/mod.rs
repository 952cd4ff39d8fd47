//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (route_id, request_id, trace_id, client_ip fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Request and trace IDs are log fields, not span magic
//! - Metrics are cheap facade calls; no exporter means no cost

pub mod logging;
pub mod metrics;
