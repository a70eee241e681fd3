//! Query tree node types.
//!
//! The query tree is produced by the host's parse/analyze pipeline and is
//! read-only to the cache except for parameter-hole bookkeeping on nodes the
//! cache recognizes. Node kinds form a closed set; every operation over them
//! (walking, serialization, fingerprinting) dispatches on the variant tag.

use crate::ids::{FunctionId, RelationId};
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};

/// Source location carried by expression nodes, or -1 when unknown.
pub type Location = i32;

pub const UNKNOWN_LOCATION: Location = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
    Utility,
}

/// One analyzed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub command: CommandKind,
    pub range_tables: Vec<RangeTable>,
    /// Combined FROM/WHERE qualification, if any
    pub jointree: Option<Expr>,
    pub target_list: Vec<TargetEntry>,
    /// Statement identifier assigned by the host, 0 when unassigned
    pub query_id: i64,
    /// Payload for `CommandKind::Utility` statements
    pub utility: Option<UtilityStmt>,
}

impl Query {
    /// A minimal SELECT over the given relations, used by callers that build
    /// query trees by hand (and by tests).
    pub fn select(range_tables: Vec<RangeTable>) -> Self {
        Self {
            command: CommandKind::Select,
            range_tables,
            jointree: None,
            target_list: Vec::new(),
            query_id: 0,
            utility: None,
        }
    }
}

/// Utility statements the cache inspects at analyze time. Everything it
/// doesn't care about collapses to `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UtilityStmt {
    Explain { query: Box<Query> },
    AlterExtension { name: String },
    DropExtension { name: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeTable {
    pub relation: RelationId,
    pub alias: Option<String>,
}

impl RangeTable {
    pub fn new(relation: RelationId) -> Self {
        Self {
            relation,
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub expr: Expr,
    pub name: Option<String>,
}

impl TargetEntry {
    pub fn new(expr: Expr) -> Self {
        Self { expr, name: None }
    }

    pub fn named(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            expr,
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const {
        value: ScalarValue,
        location: Location,
    },
    ColumnRef {
        /// 1-based index into the query's range tables
        table_index: u32,
        column: u32,
        location: Location,
    },
    /// Function call. `coll_tag` is the node's collation tag; the
    /// parameter-hole machinery overwrites it with the source location on
    /// marked holes because the external planner is known to pass the field
    /// through unchanged while discarding location metadata. Fragile by
    /// nature: any external stage that starts consulting the tag on hole
    /// nodes breaks the hand-off.
    FuncCall {
        func_id: FunctionId,
        args: Vec<Expr>,
        location: Location,
        coll_tag: u32,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        location: Location,
    },
    BoolExpr {
        op: BoolOperator,
        args: Vec<Expr>,
    },
    /// Sub-select embedded in an expression
    SubLink {
        query: Box<Query>,
        location: Location,
    },
}

impl Expr {
    pub fn location(&self) -> Location {
        match self {
            Expr::Const { location, .. } => *location,
            Expr::ColumnRef { location, .. } => *location,
            Expr::FuncCall { location, .. } => *location,
            Expr::BinaryOp { location, .. } => *location,
            Expr::BoolExpr { .. } => UNKNOWN_LOCATION,
            Expr::SubLink { location, .. } => *location,
        }
    }

    pub fn constant(value: ScalarValue, location: Location) -> Self {
        Expr::Const { value, location }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOperator {
    And,
    Or,
    Not,
}
