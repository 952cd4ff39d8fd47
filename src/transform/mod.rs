//! Response shaping by compliance profile.
//!
//! # Data Flow
//! ```text
//! X-Compliance-Profile header
//!     → profile.rs (PROFILE_TABLE lookup, case-insensitive, Default fallback)
//!     → envelope.rs (wrap_success for 2xx bodies, wrap_error for the renderer)
//! ```
//!
//! # Design Decisions
//! - The profile is a closed enum; the header mapping is a data table
//! - Selection is pure and resolved once per request
//! - Every envelope carries the upstream payload unchanged

pub mod envelope;
pub mod profile;

pub use envelope::{status_name, EnvelopeContext};
pub use profile::{select_profile, ComplianceProfile, COMPLIANCE_PROFILE_HEADER};
