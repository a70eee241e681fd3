//! Dependency Invalidation Example
//!
//! Shows stored plans being disabled when a relation or index they depend
//! on is dropped, while unrelated entries keep serving.

use anyhow::Result;
use plancache_core::{IndexId, Plan, PlanKind, PlannedStmt, RelationId};
use plancache_store::{CacheEntry, DependencyInvalidator, DropEvent, PlanStore};
use std::sync::Arc;

fn stored_entry(
    query_fp: u32,
    text: &str,
    relation: RelationId,
    index: Option<IndexId>,
) -> Result<CacheEntry> {
    let plan = match index {
        Some(index) => Plan::new(PlanKind::IndexScan { relation, index }),
        None => Plan::new(PlanKind::SeqScan { relation }),
    };
    let stmt = PlannedStmt::new(plan);
    let mut entry = CacheEntry::new(query_fp, query_fp, text, serde_json::to_vec(&stmt)?)
        .with_relation_deps([relation]);
    if let Some(index) = index {
        entry = entry.with_index_deps([index]);
    }
    Ok(entry)
}

fn describe(store: &PlanStore, fingerprints: &[(u32, &str)]) {
    let scope = store.read_scope();
    for (fingerprint, text) in fingerprints {
        let served = scope.lookup_by_query_fingerprint(*fingerprint, 0).is_some();
        println!(
            "  [{}] {}",
            if served { "serving " } else { "disabled" },
            text
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== Dependency Invalidation Example ===\n");

    let orders = RelationId(100);
    let customers = RelationId(200);
    let orders_by_date = IndexId(300);

    let store = Arc::new(PlanStore::new());
    {
        let mut scope = store.write_scope();
        scope.insert(stored_entry(
            1,
            "SELECT * FROM orders WHERE placed_at > _p('2026-01-01')",
            orders,
            Some(orders_by_date),
        )?)?;
        scope.insert(stored_entry(
            2,
            "SELECT * FROM customers WHERE id = _p(0)",
            customers,
            None,
        )?)?;
        scope.set_enabled(1, 1, true)?;
        scope.set_enabled(2, 1, true)?;
    }

    let queries = [
        (1, "orders by date"),
        (2, "customers by id"),
    ];
    println!("before any drops:");
    describe(&store, &queries);

    let invalidator = DependencyInvalidator::new(Arc::clone(&store));

    // Dropping the index disables the plan that scans it.
    let touched = invalidator.on_object_dropped(DropEvent::index(orders_by_date));
    println!("\ndropped index orders_by_date ({} entry disabled):", touched);
    describe(&store, &queries);

    // Dropping an unrelated relation leaves the survivor alone.
    let touched = invalidator.on_object_dropped(DropEvent::relation(RelationId(999)));
    println!("\ndropped unrelated relation ({} entries disabled):", touched);
    describe(&store, &queries);

    // Dropping the customers relation disables the remaining plan. Entries
    // stay in the store either way; invalidation never deletes.
    invalidator.on_object_dropped(DropEvent::relation(customers));
    println!("\ndropped relation customers:");
    describe(&store, &queries);
    println!("\nstored entries after all drops: {}", store.len());

    println!("\n=== Example completed! ===");
    Ok(())
}
