//! Parameter-hole collection and rebinding.
//!
//! A hole is a call to the registered opaque-identity marker function
//! wrapped around one literal argument. Collection records each hole's
//! source location, payload and collation tag, then overwrites the node's
//! collation tag with the location: the external planner discards location
//! metadata but passes the tag through untouched, so the tag is the only
//! positional identity a hole keeps across planning. Rebinding walks a
//! (typically deserialized) plan's qual and target-list expressions and
//! splices each current payload back into the hole carrying its location
//! tag. A hole nobody collected stays the canonical placeholder.

use crate::config::LogLevel;
use plancache_core::{
    execute_for_plantree, plan_tree_visitor, walk_expr, walk_query, Expr, FunctionId, Location,
    Plan, PlannedStmt, Query, Result, ScalarValue, WalkFlow,
};

/// One collected hole, scoped to a single planning call. Never persisted.
#[derive(Debug, Clone)]
pub struct QueryParam {
    /// Source-location counter of the hole in the current invocation
    pub location: Location,
    /// The literal argument node as written in the current invocation
    pub payload: Expr,
    /// The collation tag the hole carried before it was overwritten
    pub saved_tag: u32,
}

/// Is this expression a marked parameter hole?
pub fn is_hole(expr: &Expr, marker_fn: FunctionId) -> bool {
    matches!(expr, Expr::FuncCall { func_id, .. } if *func_id == marker_fn)
}

/// Scan a query tree for holes. Records one [`QueryParam`] per hole and
/// performs the in-place tag overwrite described in the module docs. Does
/// not recurse into a hole's argument.
pub fn collect_params(
    query: &mut Query,
    marker_fn: FunctionId,
    log: LogLevel,
) -> Result<Vec<QueryParam>> {
    let mut params = Vec::new();
    walk_query(
        query,
        &mut |expr: &mut Expr, params: &mut Vec<QueryParam>| {
            if let Expr::FuncCall {
                func_id,
                args,
                location,
                coll_tag,
            } = expr
            {
                if *func_id == marker_fn {
                    if let Some(arg) = args.first() {
                        params.push(QueryParam {
                            location: *location,
                            payload: arg.clone(),
                            saved_tag: *coll_tag,
                        });
                        *coll_tag = *location as u32;
                        log.log(format_args!("collected parameter at {}", location));
                    }
                    return WalkFlow::SkipChildren;
                }
            }
            WalkFlow::Descend
        },
        &mut params,
    )?;
    Ok(params)
}

/// Rebind a plan tree against the current invocation's collected holes.
/// Walks every plan node's qual and target-list expressions; holes whose
/// location tag matches a collected parameter get the payload and the
/// saved collation tag spliced back in.
pub fn restore_params(
    stmt: &mut PlannedStmt,
    params: &[QueryParam],
    marker_fn: FunctionId,
    log: LogLevel,
) -> Result<()> {
    for_each_plan_expr(stmt, &mut |expr| {
        walk_expr(
            expr,
            &mut |candidate: &mut Expr, _: &mut ()| restore_one(candidate, params, marker_fn, log),
            &mut (),
        )
        .map(|_| ())
    })
}

/// Run `apply` over every qual and target-list expression of every plan
/// node in the statement, subplans included.
fn for_each_plan_expr<F>(stmt: &mut PlannedStmt, apply: &mut F) -> Result<()>
where
    F: FnMut(&mut Expr) -> Result<()>,
{
    let mut outcome: Result<()> = Ok(());
    execute_for_plantree(
        stmt,
        &mut |outcome: &mut Result<()>, plan: &mut Plan| {
            plan_tree_visitor(
                plan,
                &mut |node: &mut Plan, outcome: &mut Result<()>| {
                    for expr in node
                        .qual
                        .iter_mut()
                        .chain(node.target_list.iter_mut().map(|entry| &mut entry.expr))
                    {
                        if outcome.is_ok() {
                            if let Err(err) = apply(expr) {
                                *outcome = Err(err);
                            }
                        }
                    }
                },
                outcome,
            )
        },
        &mut outcome,
    )?;
    outcome
}

fn restore_one(
    expr: &mut Expr,
    params: &[QueryParam],
    marker_fn: FunctionId,
    log: LogLevel,
) -> WalkFlow {
    if let Expr::FuncCall {
        func_id,
        args,
        coll_tag,
        ..
    } = expr
    {
        if *func_id == marker_fn {
            match params
                .iter()
                .find(|param| param.location as u32 == *coll_tag)
            {
                Some(param) => {
                    if let Some(slot) = args.first_mut() {
                        *slot = param.payload.clone();
                    }
                    *coll_tag = param.saved_tag;
                    log.log(format_args!("restored parameter at {}", param.location));
                }
                None => {
                    // Documented limitation: the hole keeps its canonical
                    // placeholder.
                    tracing::debug!(tag = *coll_tag, "no collected parameter for hole");
                }
            }
            return WalkFlow::SkipChildren;
        }
    }
    WalkFlow::Descend
}

/// Replace every hole's argument with the canonical placeholder while
/// keeping the location tag. Applied to the copy of a freshly built plan
/// that is about to be serialized, so stored bytes (and therefore plan
/// fingerprints) cannot differ between invocations that only disagree on
/// literal values.
pub fn canonicalize_plan_params(stmt: &mut PlannedStmt, marker_fn: FunctionId) -> Result<()> {
    for_each_plan_expr(stmt, &mut |expr| {
        walk_expr(
            expr,
            &mut |candidate: &mut Expr, _: &mut ()| {
                if let Expr::FuncCall { func_id, args, .. } = candidate {
                    if *func_id == marker_fn {
                        *args = vec![Expr::constant(
                            ScalarValue::canonical_placeholder(),
                            plancache_core::UNKNOWN_LOCATION,
                        )];
                        return WalkFlow::SkipChildren;
                    }
                }
                WalkFlow::Descend
            },
            &mut (),
        )
        .map(|_| ())
    })
}
