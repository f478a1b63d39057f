//! Relational intermediate representation: expressions, query nodes,
//! and the predicate-pushdown optimizer (spec §3, §4.7 steps 2–4,
//! §4.13).
//!
//! Grounded on the teacher's `crates/query/src/ast/*` (the `Expr` sum
//! type and its builder methods) and `crates/query/src/optimizer/*`
//! (a `Pass`-based rewrite over a logical plan); this crate collapses
//! the teacher's many single-purpose passes into the two the spec
//! actually calls for — predicate pushdown and subquery flattening —
//! since there is no cost-based planner here.

pub mod expr;
pub mod optimizer;
pub mod query;

pub use expr::{AggregateCall, AggregateConfig, Expr, FuncCall, IncludesSubquery, OperatorFactory, RefPath};
pub use query::{collect_direct_collection_aliases, FromClause, JoinClause, OrderByItem, QueryNode, SelectItem, SortOrder};
