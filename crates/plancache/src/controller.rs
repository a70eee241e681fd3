//! The lookup-or-build controller wrapped around the external planner.
//!
//! The read path serves cached plans under the store's shared lock scope;
//! the write path escalates to the exclusive scope, re-checks (another
//! writer may have gotten there during the escalation window), builds
//! through the external planner, suppresses byte-identical duplicates and
//! persists new entries disabled. A freshly stored plan is never served by
//! the call that built it — promotion is a separate operator action.
//!
//! Cache-layer failures must never change query results: every degraded
//! path falls through to the external planner, and the worst observable
//! effect is "re-planned instead of served".

use crate::config::CacheConfig;
use crate::fingerprint::{fingerprint_query, serialize_plan};
use crate::params::{canonicalize_plan_params, collect_params, restore_params};
use crate::resolver::{IdResolver, ResolvedIds, SchemaProvider};
use plancache_core::{
    execute_for_plantree, plan_tree_visitor, CacheError, CommandKind, IndexId, Plan, PlanKind,
    PlannedStmt, Query, Result,
};
use plancache_store::{CacheEntry, PlanStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The external planner seam. Implementations receive the same context so
/// that planning triggered from inside a build carries its nesting depth.
pub trait Planner: Send + Sync {
    fn plan(&self, query: &mut Query, ctx: &mut PlanningContext) -> Result<PlannedStmt>;
}

/// Per-call state threaded through one planning request. Depth is explicit
/// context, not a process global: a nested planning call sees depth > 1 and
/// stays out of the cache entirely.
#[derive(Debug, Default)]
pub struct PlanningContext {
    pub depth: u32,
    /// Set by the analyze hook for EXPLAIN-style introspection requests
    pub explain: bool,
    /// Verbatim source text captured at analyze time, diagnostics only
    pub query_text: Option<String>,
}

impl PlanningContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Caching wrapper around an external planner.
pub struct CachingPlanner<P: Planner> {
    planner: P,
    store: Arc<PlanStore>,
    resolver: Arc<IdResolver>,
    config: CacheConfig,
    /// Runtime kill switch; starts from `config.enabled` and can be flipped
    /// off when the cache's own schema is dropped mid-process
    enabled: Arc<AtomicBool>,
}

impl<P: Planner> CachingPlanner<P> {
    pub fn new(
        planner: P,
        store: Arc<PlanStore>,
        provider: Arc<dyn SchemaProvider>,
        config: CacheConfig,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(config.enabled));
        Self {
            planner,
            store,
            resolver: Arc::new(IdResolver::new(provider)),
            config,
            enabled,
        }
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<IdResolver> {
        &self.resolver
    }

    pub(crate) fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Plan one statement, serving a cached plan when possible. Preserves
    /// the external planner's contract whenever it bypasses.
    pub fn plan(&self, query: &mut Query, ctx: &mut PlanningContext) -> Result<PlannedStmt> {
        ctx.depth += 1;
        let result = self.plan_at_depth(query, ctx);
        ctx.depth -= 1;
        result
    }

    fn plan_at_depth(&self, query: &mut Query, ctx: &mut PlanningContext) -> Result<PlannedStmt> {
        // Bypass: only plain SELECT statements are cacheable, introspection
        // requests plan fresh, and a nested call never touches the cache —
        // the outer call may already hold the store's exclusive scope.
        if query.command != CommandKind::Select
            || !self.is_enabled()
            || ctx.explain
            || ctx.depth > 1
        {
            return self.planner.plan(query, ctx);
        }

        let ids = match self.resolver.get() {
            Ok(ids) => ids,
            // Absent or broken schema degrades to plain planning.
            Err(CacheError::SchemaNotReady) | Err(CacheError::SchemaMisconfigured(_)) => {
                return self.planner.plan(query, ctx);
            }
            Err(err) => return Err(err),
        };

        let log = self.config.log_level;
        let params = collect_params(query, ids.marker_fn, log)?;
        let query_fp = fingerprint_query(query, ids.marker_fn)?;

        // ReadLookup under the shared scope.
        {
            let scope = self.store.read_scope();
            if let Some(entry) = scope.lookup_by_query_fingerprint(query_fp, 0) {
                let mut stmt = entry.decode_plan()?;
                drop(scope);
                restore_params(&mut stmt, &params, ids.marker_fn, log)?;
                self.store.stats().record_hit();
                log.log(format_args!(
                    "cached plan was used for query: {}",
                    ctx.query_text.as_deref().unwrap_or("<unknown>")
                ));
                return Ok(stmt);
            }
        }
        self.store.stats().record_miss();

        if !self.config.write_mode {
            // Serve-only mode: quick way out.
            return self.planner.plan(query, ctx);
        }

        // UpgradeForWrite: the shared scope is gone; acquire the exclusive
        // scope and re-check, because another writer may have inserted the
        // needed entry inside the escalation window.
        let mut scope = self.store.write_scope();
        if let Some(entry) = scope.lookup_by_query_fingerprint(query_fp, 0) {
            let mut stmt = entry.decode_plan()?;
            drop(scope);
            restore_params(&mut stmt, &params, ids.marker_fn, log)?;
            self.store.stats().record_hit();
            log.log(format_args!(
                "cached plan was used for query: {}",
                ctx.query_text.as_deref().unwrap_or("<unknown>")
            ));
            return Ok(stmt);
        }

        // Build under the exclusive scope, which serializes all writers.
        let stmt = self.planner.plan(query, ctx)?;

        // Serialize a canonicalized copy: stored bytes must not vary with
        // the literal values of this particular invocation.
        let mut stored = stmt.clone();
        canonicalize_plan_params(&mut stored, ids.marker_fn)?;
        let bytes = serialize_plan(&stored)?;
        let plan_fp = fxhash::hash32(&bytes);

        // DuplicateCheck: an equivalent plan reached by an earlier build
        // (typically while this fingerprint's entries were all disabled)
        // must not produce a second row.
        if scope.exists_by_plan_fingerprint(query_fp, plan_fp) {
            self.store.stats().record_duplicate();
            return Ok(stmt);
        }

        // Insert, disabled. The dependency sets for invalidation come from
        // the planner's relation list and a walk over the plan's index
        // scans.
        let index_deps = collect_index_deps(&mut stored)?;
        let entry = CacheEntry::new(
            query_fp,
            plan_fp,
            ctx.query_text.clone().unwrap_or_default(),
            bytes,
        )
        .with_relation_deps(stmt.relation_ids.iter().copied())
        .with_index_deps(index_deps)
        .with_query_id(query.query_id);
        scope.insert(entry)?;

        log.log(format_args!(
            "saved plan for query: {}",
            ctx.query_text.as_deref().unwrap_or("<unknown>")
        ));

        // Done: this call returns the freshly built plan; the stored entry
        // starts serving only after explicit promotion.
        Ok(stmt)
    }

    /// Identifiers currently backing the cache, for callers that construct
    /// hole markers by hand.
    pub fn resolved_ids(&self) -> Result<ResolvedIds> {
        self.resolver.get()
    }

    /// Build the post-analyze hook wired to this planner's resolver and
    /// kill switch.
    pub fn analyzer(&self) -> crate::analyze::Analyzer {
        crate::analyze::Analyzer::new(Arc::clone(&self.resolver), self.enabled_flag())
    }
}

/// Every index referenced by index-shaped scans anywhere in the statement.
fn collect_index_deps(stmt: &mut PlannedStmt) -> Result<Vec<IndexId>> {
    let mut ids: Vec<IndexId> = Vec::new();
    execute_for_plantree(
        stmt,
        &mut |ids: &mut Vec<IndexId>, plan: &mut Plan| {
            plan_tree_visitor(
                plan,
                &mut |node: &mut Plan, ids: &mut Vec<IndexId>| match node.kind {
                    PlanKind::IndexScan { index, .. }
                    | PlanKind::IndexOnlyScan { index, .. }
                    | PlanKind::BitmapIndexScan { index } => ids.push(index),
                    _ => {}
                },
                ids,
            )
        },
        &mut ids,
    )?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::resolver::MemoryCatalog;
    use plancache_core::{
        BinaryOperator, Expr, FunctionId, RangeTable, RelationId, ScalarValue, WalkFlow,
    };
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Deterministic stand-in for the external planner: one sequential scan
    /// per statement, quals taken verbatim from the jointree.
    struct StubPlanner {
        calls: AtomicUsize,
    }

    impl StubPlanner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Planner for StubPlanner {
        fn plan(&self, query: &mut Query, _ctx: &mut PlanningContext) -> Result<PlannedStmt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let relation = query
                .range_tables
                .first()
                .map(|rt| rt.relation)
                .unwrap_or(RelationId::INVALID);
            let mut plan = Plan::new(PlanKind::SeqScan { relation });
            if let Some(jointree) = &query.jointree {
                let mut qual = jointree.clone();
                strip_locations(&mut qual);
                plan.qual.push(qual);
            }
            let mut stmt = PlannedStmt::new(plan);
            stmt.relation_ids = query.range_tables.iter().map(|rt| rt.relation).collect();
            stmt.query_id = query.query_id;
            Ok(stmt)
        }
    }

    /// The external planner is known to discard source locations.
    fn strip_locations(expr: &mut Expr) {
        let _ = plancache_core::walk_expr(
            expr,
            &mut |node: &mut Expr, _: &mut ()| {
                match node {
                    Expr::Const { location, .. }
                    | Expr::ColumnRef { location, .. }
                    | Expr::FuncCall { location, .. }
                    | Expr::BinaryOp { location, .. }
                    | Expr::SubLink { location, .. } => *location = -1,
                    Expr::BoolExpr { .. } => {}
                }
                WalkFlow::Descend
            },
            &mut (),
        );
    }

    fn test_setup() -> (CachingPlanner<StubPlanner>, FunctionId) {
        let catalog = MemoryCatalog::with_cache_schema();
        let store = Arc::new(PlanStore::new());
        let planner = CachingPlanner::new(
            StubPlanner::new(),
            store,
            catalog,
            CacheConfig::default()
                .with_write_mode(true)
                .with_log_level(LogLevel::None),
        );
        let marker = planner.resolved_ids().unwrap().marker_fn;
        (planner, marker)
    }

    /// `SELECT * FROM rel WHERE col = _p(value)`
    fn select_with_hole(marker: FunctionId, rel: u32, value: i64) -> Query {
        let width = value.to_string().len() as i32;
        let mut query = Query::select(vec![RangeTable::new(RelationId(rel))]);
        query.jointree = Some(Expr::BinaryOp {
            op: BinaryOperator::Eq,
            left: Box::new(Expr::ColumnRef {
                table_index: 1,
                column: 1,
                location: 21,
            }),
            right: Box::new(Expr::FuncCall {
                func_id: marker,
                args: vec![Expr::constant(ScalarValue::Int64(Some(value)), 30)],
                location: 27,
                coll_tag: 0,
            }),
            location: 25 + width,
        });
        query
    }

    fn hole_literal(stmt: &PlannedStmt, marker: FunctionId) -> Option<ScalarValue> {
        let mut found = None;
        let mut stmt = stmt.clone();
        let _ = execute_for_plantree(
            &mut stmt,
            &mut |found: &mut Option<ScalarValue>, plan: &mut Plan| {
                plan_tree_visitor(
                    plan,
                    &mut |node: &mut Plan, found: &mut Option<ScalarValue>| {
                        for expr in node.qual.iter_mut() {
                            let _ = plancache_core::walk_expr(
                                expr,
                                &mut |candidate: &mut Expr, found: &mut Option<ScalarValue>| {
                                    if let Expr::FuncCall { func_id, args, .. } = candidate {
                                        if *func_id == marker {
                                            if let Some(Expr::Const { value, .. }) = args.first() {
                                                *found = Some(value.clone());
                                            }
                                            return WalkFlow::SkipChildren;
                                        }
                                    }
                                    WalkFlow::Descend
                                },
                                found,
                            );
                        }
                    },
                    found,
                )
            },
            &mut found,
        );
        found
    }

    #[test]
    fn test_miss_builds_and_stores_disabled() {
        let (planner, marker) = test_setup();
        let mut ctx = PlanningContext::new();
        let mut query = select_with_hole(marker, 10, 1);

        let stmt = planner.plan(&mut query, &mut ctx).unwrap();
        assert_eq!(hole_literal(&stmt, marker), Some(ScalarValue::Int64(Some(1))));

        // One entry, stored disabled: a second identical call still misses.
        assert_eq!(planner.store().len(), 1);
        let fp = fingerprint_query(&select_with_hole(marker, 10, 1), marker).unwrap();
        let scope = planner.store().read_scope();
        let entry = scope.lookup_by_query_fingerprint(fp, 1).unwrap();
        assert!(!entry.enabled);
    }

    #[test]
    fn test_example_scenario_end_to_end() {
        let (planner, marker) = test_setup();

        // First call, value 1: miss, plan built and stored disabled.
        let mut ctx = PlanningContext::new();
        planner
            .plan(&mut select_with_hole(marker, 10, 1), &mut ctx)
            .unwrap();
        assert_eq!(planner.store().len(), 1);
        assert_eq!(planner.planner.calls(), 1);

        // Second call, value 2, entry still disabled: miss again, but the
        // canonicalized plan bytes match — duplicate suppressed.
        planner
            .plan(&mut select_with_hole(marker, 10, 2), &mut ctx)
            .unwrap();
        assert_eq!(planner.store().len(), 1);
        assert_eq!(planner.store().stats().duplicates(), 1);
        assert_eq!(planner.planner.calls(), 2);

        // Operator enables the entry.
        let fp = fingerprint_query(&select_with_hole(marker, 10, 3), marker).unwrap();
        planner
            .store()
            .write_scope()
            .set_enabled(fp, 1, true)
            .unwrap();

        // Third call, value 3: hit, and the served plan carries 3, not 1.
        let stmt = planner
            .plan(&mut select_with_hole(marker, 10, 3), &mut ctx)
            .unwrap();
        assert_eq!(planner.planner.calls(), 2);
        assert_eq!(hole_literal(&stmt, marker), Some(ScalarValue::Int64(Some(3))));
        assert_eq!(planner.store().stats().hits(), 1);
    }

    #[test]
    fn test_read_only_mode_never_stores() {
        let catalog = MemoryCatalog::with_cache_schema();
        let store = Arc::new(PlanStore::new());
        let planner = CachingPlanner::new(
            StubPlanner::new(),
            store,
            catalog,
            CacheConfig::default(), // write_mode off
        );
        let marker = planner.resolved_ids().unwrap().marker_fn;

        let mut ctx = PlanningContext::new();
        planner
            .plan(&mut select_with_hole(marker, 10, 1), &mut ctx)
            .unwrap();
        assert!(planner.store().is_empty());
        assert_eq!(planner.store().stats().misses(), 1);
    }

    #[test]
    fn test_bypass_non_select_and_explain() {
        let (planner, marker) = test_setup();

        let mut update = select_with_hole(marker, 10, 1);
        update.command = CommandKind::Update;
        let mut ctx = PlanningContext::new();
        planner.plan(&mut update, &mut ctx).unwrap();
        assert!(planner.store().is_empty());

        let mut ctx = PlanningContext::new();
        ctx.explain = true;
        planner
            .plan(&mut select_with_hole(marker, 10, 1), &mut ctx)
            .unwrap();
        assert!(planner.store().is_empty());
        // Bypassed calls never even count as misses.
        assert_eq!(planner.store().stats().misses(), 0);
    }

    #[test]
    fn test_nested_depth_bypasses() {
        let (planner, marker) = test_setup();
        let mut ctx = PlanningContext::new();
        ctx.depth = 1; // simulate being called from inside another planning call

        planner
            .plan(&mut select_with_hole(marker, 10, 1), &mut ctx)
            .unwrap();
        assert!(planner.store().is_empty());
        assert_eq!(ctx.depth, 1);
    }

    #[test]
    fn test_missing_schema_bypasses_silently() {
        let catalog = Arc::new(MemoryCatalog::new()); // nothing registered
        let store = Arc::new(PlanStore::new());
        let planner = CachingPlanner::new(
            StubPlanner::new(),
            store,
            catalog,
            CacheConfig::default().with_write_mode(true),
        );

        let mut query = Query::select(vec![RangeTable::new(RelationId(1))]);
        let mut ctx = PlanningContext::new();
        let stmt = planner.plan(&mut query, &mut ctx).unwrap();
        assert_eq!(stmt.relation_ids, vec![RelationId(1)]);
        assert!(planner.store().is_empty());
    }

    #[test]
    fn test_concurrent_writers_insert_once() {
        let (planner, marker) = test_setup();
        let planner = Arc::new(planner);

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let planner = Arc::clone(&planner);
            handles.push(thread::spawn(move || {
                let mut ctx = PlanningContext::new();
                planner
                    .plan(&mut select_with_hole(marker, 10, i), &mut ctx)
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Exactly one physical entry regardless of racing builders.
        assert_eq!(planner.store().len(), 1);
        assert_eq!(planner.store().stats().stores(), 1);
    }

    #[test]
    fn test_dependency_sets_extracted_on_insert() {
        struct IndexPlanner;
        impl Planner for IndexPlanner {
            fn plan(&self, query: &mut Query, _ctx: &mut PlanningContext) -> Result<PlannedStmt> {
                let relation = query.range_tables[0].relation;
                let mut stmt = PlannedStmt::new(Plan::new(PlanKind::IndexScan {
                    relation,
                    index: IndexId(500),
                }));
                stmt.relation_ids = vec![relation];
                Ok(stmt)
            }
        }

        let catalog = MemoryCatalog::with_cache_schema();
        let store = Arc::new(PlanStore::new());
        let planner = CachingPlanner::new(
            IndexPlanner,
            store,
            catalog,
            CacheConfig::default().with_write_mode(true),
        );
        let marker = planner.resolved_ids().unwrap().marker_fn;

        let mut ctx = PlanningContext::new();
        planner
            .plan(&mut select_with_hole(marker, 10, 1), &mut ctx)
            .unwrap();

        let fp = fingerprint_query(&select_with_hole(marker, 10, 1), marker).unwrap();
        let scope = planner.store().read_scope();
        let entry = scope.lookup_by_query_fingerprint(fp, 1).unwrap();
        assert!(entry.depends_on_relation(RelationId(10)));
        assert!(entry.depends_on_index(IndexId(500)));
    }
}
