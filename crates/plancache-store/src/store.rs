//! Shared plan store with two lock strengths.
//!
//! The store is a keyed collection of [`CacheEntry`] rows addressable three
//! ways: by query fingerprint (primary lookup), by depended-on relation, and
//! by depended-on index (invalidation lookups). All three index structures
//! are maintained together under the exclusive scope, so an insert or
//! invalidation is atomic from any reader's perspective.
//!
//! Readers take a shared scope and never block each other; writers take the
//! exclusive scope, which serializes all mutation. Escalating from shared to
//! exclusive requires dropping the shared scope first, which opens a window
//! where another writer may have inserted the needed entry — callers must
//! re-check after escalation.

use crate::entry::CacheEntry;
use crate::stats::CacheStats;
use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use plancache_core::{CacheError, IndexId, RelationId, Result};
use std::sync::Arc;

#[derive(Debug, Default)]
struct StoreInner {
    /// Row heap; row position is stable because rows are never deleted
    rows: Vec<CacheEntry>,
    /// Primary index: query fingerprint -> row positions, insertion order
    by_fingerprint: AHashMap<u32, Vec<usize>>,
    /// Auxiliary index: relation dependency -> row positions
    by_relation_dep: AHashMap<RelationId, Vec<usize>>,
    /// Auxiliary index: index dependency -> row positions
    by_index_dep: AHashMap<IndexId, Vec<usize>>,
}

impl StoreInner {
    fn lookup(&self, fingerprint: u32, ordinal: usize) -> Option<&CacheEntry> {
        let rows = self.by_fingerprint.get(&fingerprint)?;
        if ordinal == 0 {
            rows.iter()
                .map(|&pos| &self.rows[pos])
                .find(|entry| entry.enabled)
        } else {
            rows.get(ordinal - 1).map(|&pos| &self.rows[pos])
        }
    }

    fn exists_by_plan_fingerprint(&self, query_fingerprint: u32, plan_fingerprint: u32) -> bool {
        self.by_fingerprint
            .get(&query_fingerprint)
            .map(|rows| {
                rows.iter()
                    .any(|&pos| self.rows[pos].plan_fingerprint == plan_fingerprint)
            })
            .unwrap_or(false)
    }

    fn matching_count(&self, fingerprint: u32) -> usize {
        self.by_fingerprint
            .get(&fingerprint)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Persistent-style keyed collection of cached plans, shared across all
/// sessions of the embedding engine. Durability of the backing rows is the
/// storage engine's concern; this type owns keying, locking and the
/// soft-invalidation lifecycle.
#[derive(Debug)]
pub struct PlanStore {
    inner: RwLock<StoreInner>,
    stats: Arc<CacheStats>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Acquire the shared lock scope. Blocks while a writer holds the
    /// exclusive scope.
    pub fn read_scope(&self) -> ReadScope<'_> {
        ReadScope {
            inner: self.inner.read(),
        }
    }

    /// Acquire the exclusive lock scope. Blocks until all other scopes are
    /// released; serializes every writer.
    pub fn write_scope(&self) -> WriteScope<'_> {
        WriteScope {
            inner: self.inner.write(),
            stats: &self.stats,
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared lock scope: read-only access, held for the duration of one lookup.
/// The guard itself is the stable snapshot — rows observed through it cannot
/// change while it is held.
pub struct ReadScope<'a> {
    inner: RwLockReadGuard<'a, StoreInner>,
}

impl ReadScope<'_> {
    /// Ordinal 0 returns the first entry with `enabled = true`; ordinal
    /// N > 0 returns the N-th matching entry regardless of enablement
    /// (diagnostic inspection).
    pub fn lookup_by_query_fingerprint(
        &self,
        fingerprint: u32,
        ordinal: usize,
    ) -> Option<&CacheEntry> {
        self.inner.lookup(fingerprint, ordinal)
    }

    pub fn exists_by_plan_fingerprint(
        &self,
        query_fingerprint: u32,
        plan_fingerprint: u32,
    ) -> bool {
        self.inner
            .exists_by_plan_fingerprint(query_fingerprint, plan_fingerprint)
    }

    /// Number of entries stored under one query fingerprint.
    pub fn matching_count(&self, fingerprint: u32) -> usize {
        self.inner.matching_count(fingerprint)
    }
}

/// Exclusive lock scope: the only path that mutates the store. Inserts and
/// flag flips performed here are visible to this scope's own re-reads
/// immediately and to other sessions once the scope is released.
pub struct WriteScope<'a> {
    inner: RwLockWriteGuard<'a, StoreInner>,
    stats: &'a CacheStats,
}

impl WriteScope<'_> {
    pub fn lookup_by_query_fingerprint(
        &self,
        fingerprint: u32,
        ordinal: usize,
    ) -> Option<&CacheEntry> {
        self.inner.lookup(fingerprint, ordinal)
    }

    pub fn exists_by_plan_fingerprint(
        &self,
        query_fingerprint: u32,
        plan_fingerprint: u32,
    ) -> bool {
        self.inner
            .exists_by_plan_fingerprint(query_fingerprint, plan_fingerprint)
    }

    /// Persist a new entry, updating the primary and both auxiliary indexes
    /// together.
    pub fn insert(&mut self, entry: CacheEntry) -> Result<()> {
        if entry.serialized_plan.is_empty() {
            return Err(CacheError::StoreIo(
                "refusing to store an empty serialized plan".into(),
            ));
        }

        let inner = &mut *self.inner;
        let pos = inner.rows.len();
        inner
            .by_fingerprint
            .entry(entry.query_fingerprint)
            .or_default()
            .push(pos);
        for &relation in &entry.relation_deps {
            inner.by_relation_dep.entry(relation).or_default().push(pos);
        }
        for &index in &entry.index_deps {
            inner.by_index_dep.entry(index).or_default().push(pos);
        }
        inner.rows.push(entry);

        self.stats.record_store();
        self.stats.set_entry_count(inner.rows.len() as u64);
        Ok(())
    }

    /// Flip `enabled` off on every entry depending on the dropped relation.
    /// Returns the number of entries touched.
    pub fn mark_invalid_by_relation_dep(&mut self, relation: RelationId) -> usize {
        let inner = &mut *self.inner;
        let mut touched = 0;
        if let Some(rows) = inner.by_relation_dep.get(&relation) {
            for &pos in rows {
                let entry = &mut inner.rows[pos];
                if entry.enabled {
                    entry.enabled = false;
                    touched += 1;
                }
            }
        }
        self.stats.record_invalidations(touched as u64);
        touched
    }

    /// Flip `enabled` off on every entry depending on the dropped index.
    /// Returns the number of entries touched.
    pub fn mark_invalid_by_index_dep(&mut self, index: IndexId) -> usize {
        let inner = &mut *self.inner;
        let mut touched = 0;
        if let Some(rows) = inner.by_index_dep.get(&index) {
            for &pos in rows {
                let entry = &mut inner.rows[pos];
                if entry.enabled {
                    entry.enabled = false;
                    touched += 1;
                }
            }
        }
        self.stats.record_invalidations(touched as u64);
        touched
    }

    /// Operator action: enable or disable the N-th entry (1-based) under a
    /// query fingerprint. Promotion of freshly stored plans happens here,
    /// never on the write path that stored them.
    pub fn set_enabled(&mut self, fingerprint: u32, ordinal: usize, enabled: bool) -> Result<()> {
        if ordinal == 0 {
            return Err(CacheError::InvalidDiagnosticRequest(
                "ordinal must be 1-based when toggling an entry".into(),
            ));
        }
        let inner = &mut *self.inner;
        let pos = inner
            .by_fingerprint
            .get(&fingerprint)
            .and_then(|rows| rows.get(ordinal - 1))
            .copied()
            .ok_or_else(|| {
                CacheError::InvalidDiagnosticRequest(format!(
                    "no saved plan {} for fingerprint {}",
                    ordinal, fingerprint
                ))
            })?;
        inner.rows[pos].enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancache_core::{Plan, PlanKind, PlannedStmt};
    use std::thread;

    fn entry(query_fp: u32, plan_fp: u32) -> CacheEntry {
        let stmt = PlannedStmt::new(Plan::new(PlanKind::SeqScan {
            relation: RelationId(1),
        }));
        CacheEntry::new(
            query_fp,
            plan_fp,
            "SELECT * FROM t",
            serde_json::to_vec(&stmt).unwrap(),
        )
    }

    #[test]
    fn test_ordinal_zero_requires_enabled() {
        let store = PlanStore::new();
        {
            let mut scope = store.write_scope();
            scope.insert(entry(7, 100)).unwrap();
        }

        let scope = store.read_scope();
        assert!(scope.lookup_by_query_fingerprint(7, 0).is_none());
        // Ordinal 1 sees the disabled entry.
        assert!(scope.lookup_by_query_fingerprint(7, 1).is_some());
    }

    #[test]
    fn test_ordinal_zero_serves_first_enabled() {
        let store = PlanStore::new();
        {
            let mut scope = store.write_scope();
            scope.insert(entry(7, 100)).unwrap();
            scope.insert(entry(7, 200)).unwrap();
            scope.set_enabled(7, 2, true).unwrap();
        }

        let scope = store.read_scope();
        let found = scope.lookup_by_query_fingerprint(7, 0).unwrap();
        assert_eq!(found.plan_fingerprint, 200);
    }

    #[test]
    fn test_duplicate_detection_scoped_to_fingerprint() {
        let store = PlanStore::new();
        {
            let mut scope = store.write_scope();
            scope.insert(entry(7, 100)).unwrap();
        }

        let scope = store.read_scope();
        assert!(scope.exists_by_plan_fingerprint(7, 100));
        assert!(!scope.exists_by_plan_fingerprint(7, 999));
        assert!(!scope.exists_by_plan_fingerprint(8, 100));
    }

    #[test]
    fn test_invalidation_touches_only_dependents() {
        let store = PlanStore::new();
        {
            let mut scope = store.write_scope();
            scope
                .insert(entry(1, 10).with_relation_deps([RelationId(100)]))
                .unwrap();
            scope
                .insert(entry(2, 20).with_relation_deps([RelationId(200)]))
                .unwrap();
            scope.set_enabled(1, 1, true).unwrap();
            scope.set_enabled(2, 1, true).unwrap();
        }

        let touched = store.write_scope().mark_invalid_by_relation_dep(RelationId(100));
        assert_eq!(touched, 1);

        let scope = store.read_scope();
        assert!(scope.lookup_by_query_fingerprint(1, 0).is_none());
        assert!(scope.lookup_by_query_fingerprint(2, 0).is_some());
    }

    #[test]
    fn test_index_dep_invalidation() {
        let store = PlanStore::new();
        {
            let mut scope = store.write_scope();
            scope
                .insert(entry(1, 10).with_index_deps([IndexId(5), IndexId(6)]))
                .unwrap();
            scope.set_enabled(1, 1, true).unwrap();
        }

        assert_eq!(store.write_scope().mark_invalid_by_index_dep(IndexId(6)), 1);
        assert!(store.read_scope().lookup_by_query_fingerprint(1, 0).is_none());
        // Entries stay in the store; invalidation never deletes.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_rejects_empty_plan() {
        let store = PlanStore::new();
        let mut bad = entry(1, 1);
        bad.serialized_plan.clear();
        assert!(store.write_scope().insert(bad).is_err());
    }

    #[test]
    fn test_set_enabled_validates_ordinal() {
        let store = PlanStore::new();
        let mut scope = store.write_scope();
        scope.insert(entry(7, 100)).unwrap();
        assert!(scope.set_enabled(7, 0, true).is_err());
        assert!(scope.set_enabled(7, 2, true).is_err());
        assert!(scope.set_enabled(9, 1, true).is_err());
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store = Arc::new(PlanStore::new());
        let mut handles = Vec::new();

        for i in 0..8u32 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut scope = store.write_scope();
                scope.insert(entry(i, i * 10)).unwrap();
                drop(scope);
                store.read_scope().lookup_by_query_fingerprint(i, 1);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        assert_eq!(store.stats().stores(), 8);
    }
}
