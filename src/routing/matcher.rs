//! Route predicate matching.
//!
//! # Responsibilities
//! - `Path`: one or more patterns, OR-ed; `*` and `{var}` match one segment,
//!   `**` matches any number of segments (including none)
//! - `Method`: one or more methods, OR-ed
//! - `Host`: one or more host patterns, case-insensitive, `*.` prefix wildcard
//! - Combine a route's predicates with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores the port
//! - Path matching is case-sensitive
//! - No predicates = always matches
//! - No regex; segment-wise comparison only

use axum::http::{request::Parts, Method};
use thiserror::Error;

use crate::routing::definition::PredicateDefinition;

/// A predicate that cannot be compiled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("unknown predicate '{0}'")]
    Unknown(String),

    #[error("predicate '{0}' has no arguments")]
    MissingArgs(String),

    #[error("invalid method '{0}'")]
    InvalidMethod(String),
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, req: &Parts) -> bool;
}

/// Build a matcher from a declarative predicate.
pub fn compile_predicate(def: &PredicateDefinition) -> Result<Box<dyn Matcher>, PredicateError> {
    let args: Vec<&str> = def
        .positional_args()
        .into_iter()
        .flat_map(|a| a.split(','))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();

    let name = def.name.as_str();
    if !["Path", "Method", "Host"].iter().any(|n| n.eq_ignore_ascii_case(name)) {
        return Err(PredicateError::Unknown(def.name.clone()));
    }
    if args.is_empty() {
        return Err(PredicateError::MissingArgs(def.name.clone()));
    }

    if name.eq_ignore_ascii_case("Path") {
        Ok(Box::new(PathMatcher::new(args)))
    } else if name.eq_ignore_ascii_case("Method") {
        let methods = args
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| PredicateError::InvalidMethod(m.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(MethodMatcher { methods }))
    } else {
        Ok(Box::new(HostMatcher::new(args)))
    }
}

/// Matches the Host header against one or more patterns.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    patterns: Vec<String>,
}

impl HostMatcher {
    /// Patterns are normalized to lowercase.
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn host_matches(pattern: &str, host: &str) -> bool {
        match pattern.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|head| head.len() > 1 && head.ends_with('.')),
            None => pattern == host,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Parts) -> bool {
        let host = req
            .headers
            .get("host")
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri.host());

        let Some(host) = host else {
            return false;
        };
        let host = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host).to_ascii_lowercase();

        self.patterns.iter().any(|p| Self::host_matches(p, &host))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` or `{name}`.
    Single,
    /// `**`.
    Any,
}

/// Matches the request path against one or more segment patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<Vec<Segment>>,
}

impl PathMatcher {
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| parse_pattern(p.as_ref())).collect(),
        }
    }
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .map(|seg| match seg {
            "**" => Segment::Any,
            "*" => Segment::Single,
            s if s.starts_with('{') && s.ends_with('}') => Segment::Single,
            s => Segment::Literal(s.to_string()),
        })
        .collect()
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Any, rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((Segment::Literal(lit), rest)) => path
            .split_first()
            .is_some_and(|(first, remaining)| lit == first && match_segments(rest, remaining)),
        Some((Segment::Single, rest)) => path
            .split_first()
            .is_some_and(|(_, remaining)| match_segments(rest, remaining)),
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &Parts) -> bool {
        let segments: Vec<&str> = split_path(req.uri.path()).collect();
        self.patterns.iter().any(|p| match_segments(p, &segments))
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Parts) -> bool {
        self.methods.contains(&req.method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Parts) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
