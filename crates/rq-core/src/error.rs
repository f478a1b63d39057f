//! Error taxonomy shared by every crate in the workspace (spec §7).
//!
//! The variant set mirrors the five error kinds spec.md draws out:
//! compile-time contract violations, runtime dataflow faults, adapter
//! faults, Salsa cycle errors, and user-function faults. Unlike the
//! teacher's hand-rolled `Display` impl (written for a `no_std` target),
//! this derives via `thiserror` since the workspace now targets `std`.

use crate::value::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A compile-time contract the compiler refuses to compile past (spec §7,
/// "Contract violations").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("alias `{alias}` collides with an ancestor query's direct-collection alias")]
    AliasCollision { alias: String },
    #[error("`limit`/`offset` requires an `orderBy` clause")]
    LimitWithoutOrderBy,
    #[error("`distinct` requires a `select` (or a functional select)")]
    DistinctWithoutSelect,
    #[error("`having` requires `groupBy` (or an implicit single-group aggregation)")]
    HavingWithoutGroupBy,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: Value },

    #[error("key not found: {0}")]
    NotFound(String),

    /// A source collection (or the union collection) entered `error` or
    /// `cleaned-up` mid-flight; this is terminal for dependents (spec §7).
    #[error("dataflow fault: {0}")]
    DataflowFault(String),

    /// A `loadSubset`/sync adapter rejected or failed.
    #[error("adapter fault: {0}")]
    AdapterFault(String),

    /// A Salsa read formed a cycle; raised before the context is pushed.
    #[error("salsa dependency cycle detected at query {0}")]
    SalsaCycle(String),

    /// A user-provided predicate, aggregate, or operator factory panicked
    /// or returned an error; the in-progress write transaction is rolled
    /// back by the caller.
    #[error("user function error: {0}")]
    UserFunction(String),

    /// A union collection saw the same key reported present by two
    /// sources at once.
    #[error("union key conflict: key {0} is owned by more than one source")]
    UnionKeyConflict(String),
}
