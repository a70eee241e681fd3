//! Core types for the plan cache: errors, object identifiers, query and
//! plan tree node kinds, and the generic tree walker every other component
//! builds on.

pub mod error;
pub mod ids;
pub mod plan;
pub mod query;
pub mod value;
pub mod walker;

pub use error::{CacheError, Result};
pub use ids::{FunctionId, IndexId, RelationId, SchemaId};
pub use plan::{Plan, PlanKind, PlannedStmt};
pub use query::{
    BinaryOperator, BoolOperator, CommandKind, Expr, Location, Query, RangeTable, TargetEntry,
    UtilityStmt, UNKNOWN_LOCATION,
};
pub use value::ScalarValue;
pub use walker::{
    execute_for_plantree, plan_tree_visitor, walk_expr, walk_query, WalkFlow, MAX_TREE_DEPTH,
};
