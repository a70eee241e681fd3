//! Content fingerprints over query and plan trees.
//!
//! Query fingerprints are computed over a canonicalized scratch copy so
//! that structurally identical queries hash identically no matter what
//! literal values sit in their parameter holes: every hole's argument is
//! replaced by one fixed constant, every source location and every hole's
//! collation tag is reset to a sentinel (literal width must not be able to
//! shift downstream locations into the hash). Plan fingerprints hash the
//! serialized plan bytes and exist purely for duplicate suppression.
//!
//! Both hashes are 32 bits of a stable non-cryptographic function. Two
//! distinct plans colliding under one query fingerprint would make the
//! duplicate check skip an insertion; at the intended table sizes that is
//! treated as astronomically rare and tolerated, not corrected.

use plancache_core::{
    walk_query, Expr, FunctionId, PlannedStmt, Query, Result, ScalarValue, WalkFlow,
    UNKNOWN_LOCATION,
};

/// Fingerprint a query tree, invariant under hole payload substitution.
pub fn fingerprint_query(query: &Query, marker_fn: FunctionId) -> Result<u32> {
    let mut scratch = query.clone();
    canonicalize_query(&mut scratch, marker_fn)?;
    let bytes = serde_json::to_vec(&scratch)?;
    Ok(fxhash::hash32(&bytes))
}

/// Fingerprint a plan tree over its serialized bytes.
pub fn fingerprint_plan(stmt: &PlannedStmt) -> Result<u32> {
    Ok(fxhash::hash32(&serialize_plan(stmt)?))
}

/// The canonical serialized form of a plan tree — the exact bytes stored in
/// a cache entry and hashed for duplicate suppression.
pub fn serialize_plan(stmt: &PlannedStmt) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(stmt)?)
}

fn canonicalize_query(query: &mut Query, marker_fn: FunctionId) -> Result<()> {
    query.query_id = 0;
    walk_query(
        query,
        &mut |expr: &mut Expr, _: &mut ()| {
            match expr {
                Expr::Const { location, .. }
                | Expr::ColumnRef { location, .. }
                | Expr::BinaryOp { location, .. } => *location = UNKNOWN_LOCATION,
                Expr::BoolExpr { .. } => {}
                Expr::SubLink { query, location } => {
                    *location = UNKNOWN_LOCATION;
                    query.query_id = 0;
                }
                Expr::FuncCall {
                    func_id,
                    args,
                    location,
                    coll_tag,
                } => {
                    *location = UNKNOWN_LOCATION;
                    if *func_id == marker_fn {
                        *coll_tag = 0;
                        *args = vec![Expr::constant(
                            ScalarValue::canonical_placeholder(),
                            UNKNOWN_LOCATION,
                        )];
                        return WalkFlow::SkipChildren;
                    }
                }
            }
            WalkFlow::Descend
        },
        &mut (),
    )?;
    Ok(())
}
