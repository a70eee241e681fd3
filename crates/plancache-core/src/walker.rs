//! Generic traversal over query and plan trees.
//!
//! Plan traversal is post-order: plan-specific child containers first (in
//! the fixed order subquery child, custom, append, merge-append, bitmap-and,
//! bitmap-or, modify-table child lists), then the generic left and right
//! children, then the visitor on the current node. Expression traversal is
//! pre-order so visitors can prune subtrees. Both are guarded against
//! unbounded recursion; side effects are confined to the context threaded
//! through by the caller.

use crate::error::{CacheError, Result};
use crate::plan::{Plan, PlanKind, PlannedStmt};
use crate::query::{Expr, Query};

/// Depth budget for any single tree. Trees deeper than this fail the walk
/// instead of overflowing the stack.
pub const MAX_TREE_DEPTH: usize = 512;

/// Visitor verdict for expression and query walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkFlow {
    /// Recurse into this node's children
    Descend,
    /// Do not recurse into this node's children; continue elsewhere
    SkipChildren,
    /// Stop the entire walk
    Break,
}

/// Walk one plan tree in post-order, applying `visitor` to every node after
/// its children.
pub fn plan_tree_visitor<C, V>(plan: &mut Plan, visitor: &mut V, context: &mut C) -> Result<()>
where
    V: FnMut(&mut Plan, &mut C),
{
    plan_tree_visitor_at(plan, visitor, context, 0)
}

fn plan_tree_visitor_at<C, V>(
    plan: &mut Plan,
    visitor: &mut V,
    context: &mut C,
    depth: usize,
) -> Result<()>
where
    V: FnMut(&mut Plan, &mut C),
{
    if depth > MAX_TREE_DEPTH {
        return Err(CacheError::RecursionLimitExceeded("plan"));
    }

    match &mut plan.kind {
        PlanKind::SubqueryScan { subplan } => {
            plan_tree_visitor_at(subplan, visitor, context, depth + 1)?;
        }
        PlanKind::CustomScan { children }
        | PlanKind::Append { children }
        | PlanKind::MergeAppend { children }
        | PlanKind::BitmapAnd { children }
        | PlanKind::BitmapOr { children }
        | PlanKind::ModifyTable { children } => {
            for child in children.iter_mut() {
                plan_tree_visitor_at(child, visitor, context, depth + 1)?;
            }
        }
        _ => {}
    }

    if let Some(left) = plan.left.as_deref_mut() {
        plan_tree_visitor_at(left, visitor, context, depth + 1)?;
    }
    if let Some(right) = plan.right.as_deref_mut() {
        plan_tree_visitor_at(right, visitor, context, depth + 1)?;
    }

    visitor(plan, context);
    Ok(())
}

/// Apply `proc` to the statement's top plan and to each subplan.
pub fn execute_for_plantree<C, P>(
    stmt: &mut PlannedStmt,
    proc: &mut P,
    context: &mut C,
) -> Result<()>
where
    P: FnMut(&mut C, &mut Plan) -> Result<()>,
{
    proc(context, &mut stmt.plan)?;
    for subplan in stmt.subplans.iter_mut() {
        proc(context, subplan)?;
    }
    Ok(())
}

/// Walk one expression tree in pre-order. The visitor runs before a node's
/// children and can prune or abort via its [`WalkFlow`] verdict.
pub fn walk_expr<C, V>(expr: &mut Expr, visitor: &mut V, context: &mut C) -> Result<WalkFlow>
where
    V: FnMut(&mut Expr, &mut C) -> WalkFlow,
{
    walk_expr_at(expr, visitor, context, 0)
}

fn walk_expr_at<C, V>(
    expr: &mut Expr,
    visitor: &mut V,
    context: &mut C,
    depth: usize,
) -> Result<WalkFlow>
where
    V: FnMut(&mut Expr, &mut C) -> WalkFlow,
{
    if depth > MAX_TREE_DEPTH {
        return Err(CacheError::RecursionLimitExceeded("expression"));
    }

    match visitor(expr, context) {
        WalkFlow::Break => return Ok(WalkFlow::Break),
        WalkFlow::SkipChildren => return Ok(WalkFlow::Descend),
        WalkFlow::Descend => {}
    }

    match expr {
        Expr::Const { .. } | Expr::ColumnRef { .. } => {}
        Expr::FuncCall { args, .. } | Expr::BoolExpr { args, .. } => {
            for arg in args.iter_mut() {
                if walk_expr_at(arg, visitor, context, depth + 1)? == WalkFlow::Break {
                    return Ok(WalkFlow::Break);
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            if walk_expr_at(left, visitor, context, depth + 1)? == WalkFlow::Break {
                return Ok(WalkFlow::Break);
            }
            if walk_expr_at(right, visitor, context, depth + 1)? == WalkFlow::Break {
                return Ok(WalkFlow::Break);
            }
        }
        Expr::SubLink { query, .. } => {
            if walk_query_at(query, visitor, context, depth + 1)? == WalkFlow::Break {
                return Ok(WalkFlow::Break);
            }
        }
    }

    Ok(WalkFlow::Descend)
}

/// Walk every expression reachable from a query tree: the jointree, the
/// target list, and (through sub-links) any nested queries.
pub fn walk_query<C, V>(query: &mut Query, visitor: &mut V, context: &mut C) -> Result<WalkFlow>
where
    V: FnMut(&mut Expr, &mut C) -> WalkFlow,
{
    walk_query_at(query, visitor, context, 0)
}

fn walk_query_at<C, V>(
    query: &mut Query,
    visitor: &mut V,
    context: &mut C,
    depth: usize,
) -> Result<WalkFlow>
where
    V: FnMut(&mut Expr, &mut C) -> WalkFlow,
{
    if depth > MAX_TREE_DEPTH {
        return Err(CacheError::RecursionLimitExceeded("query"));
    }

    if let Some(jointree) = query.jointree.as_mut() {
        if walk_expr_at(jointree, visitor, context, depth + 1)? == WalkFlow::Break {
            return Ok(WalkFlow::Break);
        }
    }
    for entry in query.target_list.iter_mut() {
        if walk_expr_at(&mut entry.expr, visitor, context, depth + 1)? == WalkFlow::Break {
            return Ok(WalkFlow::Break);
        }
    }

    Ok(WalkFlow::Descend)
}
