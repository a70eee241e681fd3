//! Plan cache for a relational query planner.
//!
//! Wraps an external planner with a shared, persistent-style store of
//! execution plans keyed by query fingerprint, so structurally identical
//! statements skip planning and differ only in the literal values rebound
//! into each served copy.
//!
//! # Features
//!
//! - **Hole-invariant fingerprints**: marked literal sites hash to one key
//!   regardless of the value supplied per invocation
//! - **Double-checked locking**: lookups run under a shared lock scope;
//!   the build path escalates to an exclusive scope and re-checks before
//!   inserting, so racing writers store at most one entry
//! - **Parameter rebinding**: served plans get the current invocation's
//!   literals spliced back into their recorded positions
//! - **Dependency invalidation**: entries are disabled when a relation or
//!   index they depend on is dropped
//! - **Disabled-by-default entries**: a freshly learned plan never serves
//!   until an operator promotes it
//!
//! # Example
//!
//! ```ignore
//! use plancache::{CacheConfig, CachingPlanner, MemoryCatalog, PlanningContext};
//! use plancache_store::PlanStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(PlanStore::new());
//! let catalog = MemoryCatalog::with_cache_schema();
//! let planner = CachingPlanner::new(host_planner, store, catalog,
//!     CacheConfig::default().with_write_mode(true));
//!
//! let mut ctx = PlanningContext::new();
//! let plan = planner.plan(&mut query, &mut ctx)?;
//! ```

pub mod analyze;
pub mod config;
pub mod controller;
pub mod fingerprint;
pub mod params;
pub mod resolver;
pub mod show;

pub use analyze::{AnalyzeHook, Analyzer};
pub use config::{CacheConfig, LogLevel};
pub use controller::{CachingPlanner, Planner, PlanningContext};
pub use fingerprint::{fingerprint_plan, fingerprint_query, serialize_plan};
pub use params::{canonicalize_plan_params, collect_params, restore_params, QueryParam};
pub use resolver::{
    IdResolver, MemoryCatalog, ResolvedIds, SchemaProvider, CACHE_SCHEMA_NAME,
    MARKER_FUNCTION_NAME, STORE_RELATION_NAME,
};
pub use show::{show_cached_plan, ExplainFormat};
