//! Execution plan tree node types.
//!
//! Plan trees are produced by the external planner and treated as opaque by
//! the cache: it serializes them, hashes them, walks them for dependency
//! extraction and parameter rebinding, and hands them back unchanged
//! otherwise.

use crate::ids::{IndexId, RelationId};
use crate::query::{Expr, TargetEntry};
use serde::{Deserialize, Serialize};

/// A complete planned statement: the top plan, any independently planned
/// subplans, and the relations the plan reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStmt {
    pub plan: Plan,
    pub subplans: Vec<Plan>,
    pub relation_ids: Vec<RelationId>,
    pub query_id: i64,
}

impl PlannedStmt {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            subplans: Vec::new(),
            relation_ids: Vec::new(),
            query_id: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub kind: PlanKind,
    pub target_list: Vec<TargetEntry>,
    /// Qualification applied at this node
    pub qual: Vec<Expr>,
    pub left: Option<Box<Plan>>,
    pub right: Option<Box<Plan>>,
}

impl Plan {
    pub fn new(kind: PlanKind) -> Self {
        Self {
            kind,
            target_list: Vec::new(),
            qual: Vec::new(),
            left: None,
            right: None,
        }
    }

    pub fn with_qual(mut self, qual: Vec<Expr>) -> Self {
        self.qual = qual;
        self
    }

    pub fn with_left(mut self, left: Plan) -> Self {
        self.left = Some(Box::new(left));
        self
    }

    pub fn with_right(mut self, right: Plan) -> Self {
        self.right = Some(Box::new(right));
        self
    }

    /// Node kind label used by the explain renderer.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            PlanKind::Result => "Result",
            PlanKind::SeqScan { .. } => "Seq Scan",
            PlanKind::IndexScan { .. } => "Index Scan",
            PlanKind::IndexOnlyScan { .. } => "Index Only Scan",
            PlanKind::BitmapIndexScan { .. } => "Bitmap Index Scan",
            PlanKind::BitmapHeapScan { .. } => "Bitmap Heap Scan",
            PlanKind::SubqueryScan { .. } => "Subquery Scan",
            PlanKind::CustomScan { .. } => "Custom Scan",
            PlanKind::NestLoop => "Nested Loop",
            PlanKind::HashJoin => "Hash Join",
            PlanKind::MergeJoin => "Merge Join",
            PlanKind::Sort => "Sort",
            PlanKind::Aggregate => "Aggregate",
            PlanKind::Limit => "Limit",
            PlanKind::Append { .. } => "Append",
            PlanKind::MergeAppend { .. } => "Merge Append",
            PlanKind::BitmapAnd { .. } => "BitmapAnd",
            PlanKind::BitmapOr { .. } => "BitmapOr",
            PlanKind::ModifyTable { .. } => "ModifyTable",
        }
    }
}

/// Closed set of plan node kinds. Variants that own child plans outside the
/// generic left/right slots carry them inline; the tree walker knows how to
/// reach every one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanKind {
    Result,
    SeqScan {
        relation: RelationId,
    },
    IndexScan {
        relation: RelationId,
        index: IndexId,
    },
    IndexOnlyScan {
        relation: RelationId,
        index: IndexId,
    },
    BitmapIndexScan {
        index: IndexId,
    },
    BitmapHeapScan {
        relation: RelationId,
    },
    SubqueryScan {
        subplan: Box<Plan>,
    },
    CustomScan {
        children: Vec<Plan>,
    },
    NestLoop,
    HashJoin,
    MergeJoin,
    Sort,
    Aggregate,
    Limit,
    Append {
        children: Vec<Plan>,
    },
    MergeAppend {
        children: Vec<Plan>,
    },
    BitmapAnd {
        children: Vec<Plan>,
    },
    BitmapOr {
        children: Vec<Plan>,
    },
    ModifyTable {
        children: Vec<Plan>,
    },
}
