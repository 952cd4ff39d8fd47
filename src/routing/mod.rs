//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route loading (background, per refresh):
//!     RouteStore::get_active_routes()
//!         → cache hit: deserialize "gateway_routes_v1"
//!         → miss/corrupt: RouteRepository → builder.rs per record → cache write
//!     → table.rs (compile predicates + filters, swap snapshot)
//!
//! Invalidation:
//!     "route-updates" message → invalidation.rs → delete cache key
//!         → notify refresher → table reload
//!
//! Incoming request (method, host, path):
//!     → table.rs find() → matcher.rs (AND of predicates)
//!     → Return: matched CompiledRoute or None
//! ```
//!
//! # Design Decisions
//! - One cache entry holds the whole route set
//! - A malformed record drops only that record
//! - Store failures surface as errors; an empty table is never invented
//! - Deterministic: same input always matches same route

pub mod builder;
pub mod definition;
pub mod invalidation;
pub mod key_resolver;
pub mod matcher;
pub mod route_store;
pub mod table;

pub use builder::{ConversionError, RouteDefinitionBuilder};
pub use definition::{FilterDefinition, PredicateDefinition, RouteDefinition};
pub use invalidation::RouteCacheInvalidator;
pub use key_resolver::KeyResolverRegistry;
pub use route_store::{RouteLoadError, RouteStore};
pub use table::{CompiledRoute, RouteTable};
