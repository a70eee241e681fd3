//! Shared, persistent-style plan store.
//!
//! This crate owns the stored representation of cached plans and the
//! concurrency discipline around them:
//!
//! - **Keyed three ways**: by query fingerprint (primary), and by
//!   relation/index dependency sets (invalidation)
//! - **Two lock strengths**: shared scopes for lookups, an exclusive scope
//!   that serializes all writers
//! - **Soft invalidation**: entries are flipped off, never deleted
//! - **Statistics**: hit/miss/store/duplicate/invalidation counters

pub mod entry;
pub mod invalidation;
pub mod stats;
pub mod store;

pub use entry::CacheEntry;
pub use invalidation::{DependencyInvalidator, DropEvent};
pub use stats::CacheStats;
pub use store::{PlanStore, ReadScope, WriteScope};
