//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTLs > 0, queue sizes > 0)
//! - Check that addresses parse and required backend URLs are present
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{BackendKind, GatewayConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} is required when backend.kind = \"external\"")]
    MissingBackendUrl { field: &'static str },

    #[error("admin.api_key must be changed when the admin API is enabled")]
    PlaceholderApiKey,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.routes.cache_key.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "routes.cache_key" });
    }
    if config.routes.invalidation_channel.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "routes.invalidation_channel" });
    }
    if config.routes.cache_ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "routes.cache_ttl_secs" });
    }
    if config.routes.refresh_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "routes.refresh_interval_secs" });
    }

    if config.blacklist.cache_prefix.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "blacklist.cache_prefix" });
    }
    if config.blacklist.cache_ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "blacklist.cache_ttl_secs" });
    }

    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::Zero { field: "audit.queue_capacity" });
    }
    if config.audit.workers == 0 {
        errors.push(ValidationError::Zero { field: "audit.workers" });
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "limits.max_body_bytes" });
    }
    if config.limits.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "limits.request_timeout_secs" });
    }
    if config.limits.upstream_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "limits.upstream_timeout_secs" });
    }

    if config.backend.kind == BackendKind::External {
        if config.backend.redis_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingBackendUrl { field: "backend.redis_url" });
        }
        if config.backend.database_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingBackendUrl { field: "backend.database_url" });
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == PLACEHOLDER_API_KEY || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
