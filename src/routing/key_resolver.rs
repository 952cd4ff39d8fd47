//! Rate-limiter key resolvers.
//!
//! Routes refer to a resolver by name (`keyResolverName`). The name is
//! checked against this registry when the route is built and looked up again
//! when the rate limiter runs.

use std::collections::HashMap;

use crate::filter::Exchange;

/// Name of the resolver used when a route does not name one.
pub const DEFAULT_KEY_RESOLVER: &str = "ipKeyResolver";

/// Derives the bucket key for a request.
pub type KeyResolverFn = fn(&Exchange) -> String;

/// Name → resolver lookup table, filled at startup.
#[derive(Clone)]
pub struct KeyResolverRegistry {
    resolvers: HashMap<String, KeyResolverFn>,
}

impl std::fmt::Debug for KeyResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolverRegistry")
            .field("resolvers", &self.names())
            .finish()
    }
}

impl KeyResolverRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Registry with the built-in resolvers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_KEY_RESOLVER, client_ip_key);
        registry.register("pathKeyResolver", path_key);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, resolver: KeyResolverFn) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<KeyResolverFn> {
        self.resolvers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for KeyResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Symbolic reference stored in a filter argument: `#{@name}`.
pub fn reference(name: &str) -> String {
    format!("#{{@{name}}}")
}

/// Extract the resolver name from a `#{@name}` reference.
///
/// A bare name is accepted as well.
pub fn parse_reference(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix("#{@")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(value)
}

fn client_ip_key(exchange: &Exchange) -> String {
    exchange.context.client_ip.to_string()
}

fn path_key(exchange: &Exchange) -> String {
    exchange.uri.path().to_string()
}
