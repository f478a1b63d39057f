//! The public facade (spec §6): a fluent query builder, the
//! `defineAggregate`/`defineOperator` plugin interfaces, and the
//! `queryOnce` shortcut over live query assembly.
//!
//! Everything underneath — IR, compiler, collections, live queries,
//! Salsa — is usable directly by a collaborator that needs finer
//! control; this crate only adds the ergonomic entry points spec §6
//! names explicitly.

pub mod once;
pub mod plugins;
pub mod query_builder;

pub use once::query_once;
pub use plugins::{comparison, define_aggregate, define_operator, is_unknown, numeric, transform, AggregateDefinition, OperatorDefinition};
pub use query_builder::QueryBuilder;

pub use rq_collection::{
    Change, ChangeKind, Collection, CollectionCore, LoadOutcome, LoadSubsetOptions, NoopAdapter, OrderByTerm, Predicate, SortDirection, Status,
    SubsetDeduper, SyncAdapter, UnionCollection,
};
pub use rq_core::{RecordKey, Row, Value};
pub use rq_dataflow::operators::JoinKind;
pub use rq_ir::{Expr, SortOrder};
pub use rq_live::{CollectionRegistry, LiveQuery};
pub use rq_salsa::Database as SalsaDatabase;
