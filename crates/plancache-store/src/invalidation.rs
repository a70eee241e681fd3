//! Dependency-based invalidation.
//!
//! Consumes "object dropped" notifications from the host's schema-change
//! mechanism and flips matching entries off via the store's auxiliary
//! indexes. Best-effort by design: a plan referencing a dropped object
//! would fail to resolve anyway; invalidation guards against a stale entry
//! becoming spuriously valid again after object-identifier reuse.

use crate::store::PlanStore;
use plancache_core::{IndexId, RelationId};
use std::sync::Arc;

/// A schema object the host reports as dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEvent {
    Relation { id: RelationId },
    Index { id: IndexId },
}

impl DropEvent {
    pub fn relation(id: RelationId) -> Self {
        Self::Relation { id }
    }

    pub fn index(id: IndexId) -> Self {
        Self::Index { id }
    }
}

/// Reacts to drop notifications by disabling dependent entries.
#[derive(Debug, Clone)]
pub struct DependencyInvalidator {
    store: Arc<PlanStore>,
}

impl DependencyInvalidator {
    pub fn new(store: Arc<PlanStore>) -> Self {
        Self { store }
    }

    /// Disable every entry whose dependency set contains the dropped
    /// object. Returns the number of entries touched.
    pub fn on_object_dropped(&self, event: DropEvent) -> usize {
        let mut scope = self.store.write_scope();
        let touched = match event {
            DropEvent::Relation { id } => scope.mark_invalid_by_relation_dep(id),
            DropEvent::Index { id } => scope.mark_invalid_by_index_dep(id),
        };
        if touched > 0 {
            tracing::debug!(?event, touched, "disabled cached plans for dropped object");
        }
        touched
    }
}
