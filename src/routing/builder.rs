//! Conversion of persisted route records into route definitions.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::routing::definition::{
    ComponentDefinition, FilterDefinition, PredicateDefinition, RouteDefinition,
    ENCRYPTION_KEY_METADATA,
};
use crate::routing::key_resolver::{self, KeyResolverRegistry, DEFAULT_KEY_RESOLVER};
use crate::security::rate_limit::{DEFAULT_BURST_CAPACITY, DEFAULT_REPLENISH_RATE};
use crate::store::RouteRecord;

/// Name of the filter synthesized for rate-limited routes.
pub const RATE_LIMITER_FILTER: &str = "RequestRateLimiter";

pub const ARG_REPLENISH_RATE: &str = "replenishRate";
pub const ARG_BURST_CAPACITY: &str = "burstCapacity";
pub const ARG_KEY_RESOLVER: &str = "key-resolver";

/// Why a single record could not be converted.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid upstream uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("malformed {field}: {source}")]
    MalformedSpecs {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown key resolver '{0}'")]
    UnknownKeyResolver(String),

    #[error("invalid rate limit: replenishRate={replenish_rate}, burstCapacity={burst_capacity}")]
    InvalidRateLimit {
        replenish_rate: i32,
        burst_capacity: i32,
    },
}

/// Builds [`RouteDefinition`]s, validating resolver names against the registry.
#[derive(Debug, Clone)]
pub struct RouteDefinitionBuilder {
    resolvers: Arc<KeyResolverRegistry>,
}

impl RouteDefinitionBuilder {
    pub fn new(resolvers: Arc<KeyResolverRegistry>) -> Self {
        Self { resolvers }
    }

    pub fn build(&self, record: &RouteRecord) -> Result<RouteDefinition, ConversionError> {
        url::Url::parse(&record.uri).map_err(|source| ConversionError::InvalidUri {
            uri: record.uri.clone(),
            source,
        })?;

        let mut metadata = BTreeMap::new();
        if let Some(key) = record.encryption_key.as_deref().filter(|k| !k.trim().is_empty()) {
            metadata.insert(ENCRYPTION_KEY_METADATA.to_string(), key.to_string());
        }

        let predicates: Vec<PredicateDefinition> = parse_specs("predicates", &record.predicates)?;
        let mut filters: Vec<FilterDefinition> = parse_specs("filters", &record.filters)?;

        if record.rate_limit_enabled {
            filters.push(self.rate_limiter_filter(record)?);
        }

        tracing::debug!(
            route_id = %record.route_id,
            predicates = predicates.len(),
            filters = filters.len(),
            encrypted = metadata.contains_key(ENCRYPTION_KEY_METADATA),
            "Built route definition"
        );

        Ok(RouteDefinition {
            id: record.route_id.clone(),
            uri: record.uri.clone(),
            predicates,
            filters,
            metadata,
            order: 0,
        })
    }

    fn rate_limiter_filter(&self, record: &RouteRecord) -> Result<FilterDefinition, ConversionError> {
        let replenish_rate = record
            .rate_limit_replenish_rate
            .unwrap_or(DEFAULT_REPLENISH_RATE as i32);
        let burst_capacity = record
            .rate_limit_burst_capacity
            .unwrap_or(DEFAULT_BURST_CAPACITY as i32);

        if replenish_rate <= 0 || burst_capacity <= 0 {
            return Err(ConversionError::InvalidRateLimit {
                replenish_rate,
                burst_capacity,
            });
        }

        let resolver = record
            .key_resolver_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_KEY_RESOLVER);

        if !self.resolvers.contains(resolver) {
            return Err(ConversionError::UnknownKeyResolver(resolver.to_string()));
        }

        Ok(ComponentDefinition::new(RATE_LIMITER_FILTER)
            .with_arg(ARG_REPLENISH_RATE, replenish_rate.to_string())
            .with_arg(ARG_BURST_CAPACITY, burst_capacity.to_string())
            .with_arg(ARG_KEY_RESOLVER, key_resolver::reference(resolver)))
    }
}

/// Blank text means "no specs".
fn parse_specs(
    field: &'static str,
    text: &str,
) -> Result<Vec<ComponentDefinition>, ConversionError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|source| ConversionError::MalformedSpecs { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RouteDefinitionBuilder {
        RouteDefinitionBuilder::new(Arc::new(KeyResolverRegistry::with_defaults()))
    }

    #[test]
    fn test_plain_record() {
        let record = RouteRecord::new("users", "http://users:8080")
            .with_predicates(r#"["Path=/users/**"]"#)
            .with_filters(r#"[{"name":"StripPrefix","args":{"parts":"1"}}]"#);

        let def = builder().build(&record).unwrap();
        assert_eq!(def.id, "users");
        assert_eq!(def.predicates.len(), 1);
        assert_eq!(def.filters.len(), 1);
        assert!(def.metadata.is_empty());
    }

    #[test]
    fn test_rate_limiter_is_synthesized_last() {
        let record = RouteRecord::new("orders", "http://orders:8080")
            .with_filters(r#"["AddRequestHeader=X-Source,gateway"]"#)
            .with_rate_limit(10, 20, "");

        let def = builder().build(&record).unwrap();
        let limiter = def.filters.last().unwrap();

        assert_eq!(limiter.name, RATE_LIMITER_FILTER);
        assert_eq!(limiter.args[ARG_REPLENISH_RATE], "10");
        assert_eq!(limiter.args[ARG_BURST_CAPACITY], "20");
        assert_eq!(limiter.args[ARG_KEY_RESOLVER], "#{@ipKeyResolver}");
    }

    #[test]
    fn test_named_resolver_and_unknown_resolver() {
        let ok = RouteRecord::new("a", "http://a").with_rate_limit(5, 5, "pathKeyResolver");
        let def = builder().build(&ok).unwrap();
        assert_eq!(def.filters[0].args[ARG_KEY_RESOLVER], "#{@pathKeyResolver}");

        let bad = RouteRecord::new("b", "http://b").with_rate_limit(5, 5, "userKeyResolver");
        assert!(matches!(
            builder().build(&bad),
            Err(ConversionError::UnknownKeyResolver(name)) if name == "userKeyResolver"
        ));
    }

    #[test]
    fn test_encryption_key_metadata() {
        let record = RouteRecord::new("pay", "http://pay").with_encryption_key("s3cret");
        let def = builder().build(&record).unwrap();
        assert_eq!(def.encryption_key(), Some("s3cret"));

        let blank = RouteRecord::new("pay", "http://pay").with_encryption_key("  ");
        assert!(builder().build(&blank).unwrap().metadata.is_empty());
    }

    #[test]
    fn test_malformed_inputs_fail_the_record() {
        let bad_uri = RouteRecord::new("x", "not a uri");
        assert!(matches!(builder().build(&bad_uri), Err(ConversionError::InvalidUri { .. })));

        let bad_json = RouteRecord::new("x", "http://x").with_predicates("[{not json");
        assert!(matches!(
            builder().build(&bad_json),
            Err(ConversionError::MalformedSpecs { field: "predicates", .. })
        ));

        let bad_rate = RouteRecord::new("x", "http://x").with_rate_limit(0, 20, "");
        assert!(matches!(builder().build(&bad_rate), Err(ConversionError::InvalidRateLimit { .. })));
    }

    #[test]
    fn test_blank_specs_are_empty() {
        let record = RouteRecord::new("x", "http://x").with_predicates("").with_filters("  ");
        let def = builder().build(&record).unwrap();
        assert!(def.predicates.is_empty());
        assert!(def.filters.is_empty());
    }
}
