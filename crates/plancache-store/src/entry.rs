//! The stored unit: one cached plan for one query fingerprint.

use ahash::AHashSet;
use plancache_core::{IndexId, PlannedStmt, RelationId, Result};
use serde::{Deserialize, Serialize};

/// One row of the plan store.
///
/// Entries are created disabled; promotion to `enabled = true` is an
/// explicit operator action, never something the write path does on its
/// own. Entries are soft-invalidated (flag flipped off), never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Primary lookup key, stable across hole-value changes
    pub query_fingerprint: u32,
    /// Duplicate-suppression key over the serialized plan bytes
    pub plan_fingerprint: u32,
    /// Whether this entry may be served by ordinal-0 lookups
    pub enabled: bool,
    /// Verbatim statement text, diagnostic only
    pub query_text: String,
    /// Canonical serialized form of the plan tree
    pub serialized_plan: Vec<u8>,
    /// Relations the plan depends on, for invalidation
    pub relation_deps: AHashSet<RelationId>,
    /// Indexes the plan depends on, for invalidation
    pub index_deps: AHashSet<IndexId>,
    /// Host-assigned statement identifier, diagnostic only
    pub query_id: i64,
}

impl CacheEntry {
    pub fn new(
        query_fingerprint: u32,
        plan_fingerprint: u32,
        query_text: impl Into<String>,
        serialized_plan: Vec<u8>,
    ) -> Self {
        Self {
            query_fingerprint,
            plan_fingerprint,
            enabled: false,
            query_text: query_text.into(),
            serialized_plan,
            relation_deps: AHashSet::new(),
            index_deps: AHashSet::new(),
            query_id: 0,
        }
    }

    pub fn with_relation_deps(mut self, deps: impl IntoIterator<Item = RelationId>) -> Self {
        self.relation_deps = deps.into_iter().collect();
        self
    }

    pub fn with_index_deps(mut self, deps: impl IntoIterator<Item = IndexId>) -> Self {
        self.index_deps = deps.into_iter().collect();
        self
    }

    pub fn with_query_id(mut self, query_id: i64) -> Self {
        self.query_id = query_id;
        self
    }

    /// Deserialize the stored plan into a fresh, exclusively owned tree.
    pub fn decode_plan(&self) -> Result<PlannedStmt> {
        Ok(serde_json::from_slice(&self.serialized_plan)?)
    }

    pub fn depends_on_relation(&self, relation: RelationId) -> bool {
        self.relation_deps.contains(&relation)
    }

    pub fn depends_on_index(&self, index: IndexId) -> bool {
        self.index_deps.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancache_core::{Plan, PlanKind};

    #[test]
    fn test_entry_starts_disabled() {
        let entry = CacheEntry::new(1, 2, "SELECT 1", vec![]);
        assert!(!entry.enabled);
        assert_eq!(entry.query_fingerprint, 1);
        assert_eq!(entry.plan_fingerprint, 2);
    }

    #[test]
    fn test_decode_round_trips_stored_bytes() {
        let stmt = PlannedStmt::new(Plan::new(PlanKind::SeqScan {
            relation: RelationId(4),
        }));
        let bytes = serde_json::to_vec(&stmt).unwrap();
        let entry = CacheEntry::new(1, 2, "SELECT * FROM t", bytes)
            .with_relation_deps([RelationId(4)]);

        let decoded = entry.decode_plan().unwrap();
        assert_eq!(decoded, stmt);
        assert!(entry.depends_on_relation(RelationId(4)));
        assert!(!entry.depends_on_relation(RelationId(5)));
    }
}
