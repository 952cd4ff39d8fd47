//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via clone/Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; route changes arrive through the
//!   store + invalidation channel, not through config reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, BackendConfig, BackendKind, BlacklistConfig, GatewayConfig,
    LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RouteCacheConfig,
};
pub use validation::{validate_config, ValidationError};
