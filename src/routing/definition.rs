//! Declarative route definitions.
//!
//! A [`RouteDefinition`] is what the route cache stores and what the route
//! table compiles. Predicate and filter specs accept two JSON forms:
//!
//! ```text
//! {"name": "Path", "args": {"pattern": "/api/**"}}     long form
//! "Path=/api/**,/v2/**"                                shortcut form
//! ```
//!
//! Shortcut arguments are keyed `_genkey_0`, `_genkey_1`, ... in order.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metadata key holding the per-route encryption key.
pub const ENCRYPTION_KEY_METADATA: &str = "encryption_key";

/// Prefix of generated positional argument names.
pub const GENERATED_KEY_PREFIX: &str = "_genkey_";

/// An executable routing rule, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub order: i32,
}

impl RouteDefinition {
    /// The encryption key stored in metadata, if the route has one.
    pub fn encryption_key(&self) -> Option<&str> {
        self.metadata
            .get(ENCRYPTION_KEY_METADATA)
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }
}

/// A named component with string arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDefinition {
    pub name: String,
    pub args: BTreeMap<String, String>,
}

pub type PredicateDefinition = ComponentDefinition;
pub type FilterDefinition = ComponentDefinition;

impl ComponentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Argument values in positional order.
    ///
    /// Generated keys sort by their numeric suffix (`_genkey_10` after
    /// `_genkey_2`); named keys follow in key order.
    pub fn positional_args(&self) -> Vec<&str> {
        let mut generated: Vec<(usize, &str)> = Vec::new();
        let mut named: Vec<&str> = Vec::new();

        for (key, value) in &self.args {
            match key
                .strip_prefix(GENERATED_KEY_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
            {
                Some(index) => generated.push((index, value.as_str())),
                None => named.push(value.as_str()),
            }
        }

        generated.sort_by_key(|(index, _)| *index);
        generated
            .into_iter()
            .map(|(_, v)| v)
            .chain(named)
            .collect()
    }

    /// Look up a named argument, falling back to a positional one.
    pub fn arg(&self, name: &str, position: usize) -> Option<&str> {
        self.args
            .get(name)
            .map(String::as_str)
            .or_else(|| self.positional_args().get(position).copied())
    }
}

/// Error parsing the shortcut form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutParseError(String);

impl fmt::Display for ShortcutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to parse definition text '{}'", self.0)
    }
}

impl std::error::Error for ShortcutParseError {}

impl FromStr for ComponentDefinition {
    type Err = ShortcutParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (name, raw_args) = text
            .split_once('=')
            .ok_or_else(|| ShortcutParseError(text.to_string()))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ShortcutParseError(text.to_string()));
        }

        let args = raw_args
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .enumerate()
            .map(|(i, v)| (format!("{GENERATED_KEY_PREFIX}{i}"), v.to_string()))
            .collect();

        Ok(Self {
            name: name.to_string(),
            args,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ComponentRepr {
    Shortcut(String),
    Full {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, serde_json::Value>,
    },
}

impl<'de> Deserialize<'de> for ComponentDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ComponentRepr::deserialize(deserializer)? {
            ComponentRepr::Shortcut(text) => text.parse().map_err(serde::de::Error::custom),
            ComponentRepr::Full { name, args } => {
                let args = args
                    .into_iter()
                    .map(|(k, v)| {
                        let value = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, value)
                    })
                    .collect();
                Ok(Self { name, args })
            }
        }
    }
}
