//! Plan Caching Example
//!
//! Walks the full lifecycle of a cached plan: miss and store, duplicate
//! suppression, operator promotion, and a rebound cache hit.

use anyhow::Result;
use plancache::{
    fingerprint_query, show_cached_plan, CacheConfig, CachingPlanner, ExplainFormat, LogLevel,
    MemoryCatalog, Planner, PlanningContext,
};
use plancache_core::{
    BinaryOperator, Expr, FunctionId, Plan, PlanKind, PlannedStmt, Query, RangeTable, RelationId,
    ScalarValue, WalkFlow,
};
use plancache_store::PlanStore;
use std::sync::Arc;

/// A toy stand-in for the host's planner: every SELECT becomes one
/// sequential scan carrying the jointree as its filter. Like the real
/// thing, it discards source-location metadata.
struct HostPlanner;

impl Planner for HostPlanner {
    fn plan(
        &self,
        query: &mut Query,
        _ctx: &mut PlanningContext,
    ) -> plancache_core::Result<PlannedStmt> {
        let relation = query
            .range_tables
            .first()
            .map(|rt| rt.relation)
            .unwrap_or(RelationId::INVALID);
        let mut plan = Plan::new(PlanKind::SeqScan { relation });
        if let Some(jointree) = &query.jointree {
            let mut qual = jointree.clone();
            drop_locations(&mut qual);
            plan.qual.push(qual);
        }
        let mut stmt = PlannedStmt::new(plan);
        stmt.relation_ids = query.range_tables.iter().map(|rt| rt.relation).collect();
        Ok(stmt)
    }
}

fn drop_locations(expr: &mut Expr) {
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

/// `SELECT * FROM users WHERE id = _p(<value>)`
fn select_users(marker: FunctionId, users: RelationId, value: i64) -> Query {
    let mut query = Query::select(vec![RangeTable::new(users)]);
    query.jointree = Some(Expr::BinaryOp {
        op: BinaryOperator::Eq,
        left: Box::new(Expr::ColumnRef {
            table_index: 1,
            column: 1,
            location: 28,
        }),
        right: Box::new(Expr::FuncCall {
            func_id: marker,
            args: vec![Expr::constant(ScalarValue::Int64(Some(value)), 36)],
            location: 33,
            coll_tag: 0,
        }),
        location: 31,
    });
    query
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== Plan Caching Example ===\n");

    let catalog = MemoryCatalog::with_cache_schema();
    let users = {
        let schema = catalog.register_schema("public");
        catalog.register_relation(schema, "users")
    };
    let store = Arc::new(PlanStore::new());
    let planner = CachingPlanner::new(
        HostPlanner,
        Arc::clone(&store),
        catalog,
        CacheConfig::default()
            .with_write_mode(true)
            .with_log_level(LogLevel::Info),
    );
    let marker = planner.resolved_ids()?.marker_fn;

    let mut ctx = PlanningContext::new();
    ctx.query_text = Some("SELECT * FROM users WHERE id = _p(1)".to_string());

    // First call: miss, the plan is built and stored disabled.
    planner.plan(&mut select_users(marker, users, 1), &mut ctx)?;
    println!("after first call:  {} stored entries", store.len());

    // Second call with a different literal: still a miss (the entry is
    // disabled), and the duplicate check suppresses a second row.
    planner.plan(&mut select_users(marker, users, 2), &mut ctx)?;
    println!(
        "after second call: {} stored entries, {} duplicate suppressed",
        store.len(),
        store.stats().duplicates()
    );

    // Operator promotes the saved plan.
    let fingerprint = fingerprint_query(&select_users(marker, users, 3), marker)?;
    store.write_scope().set_enabled(fingerprint, 1, true)?;
    println!("\npromoted plan {}:", fingerprint);
    for line in show_cached_plan(&store, fingerprint, 0, ExplainFormat::Text)? {
        println!("  {}", line);
    }

    // Third call: served from the cache with the current literal rebound.
    planner.plan(&mut select_users(marker, users, 3), &mut ctx)?;

    let stats = store.stats();
    println!("\nCache statistics:");
    println!("  Hits:       {}", stats.hits());
    println!("  Misses:     {}", stats.misses());
    println!("  Stores:     {}", stats.stores());
    println!("  Duplicates: {}", stats.duplicates());

    println!("\n=== Example completed! ===");
    Ok(())
}
