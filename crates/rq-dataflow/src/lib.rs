//! Incremental view maintenance: the dataflow graph and its operators
//! (spec §4.2–§4.6).

pub mod aggregate;
pub mod graph;
pub mod operators;

pub use aggregate::{Aggregate, AggregateKind};
pub use graph::{DataflowGraph, NodeId};

use rq_core::{RecordKey, Row};
use rq_multiset::Multiset;

/// The item flowing along a dataflow edge: a keyed record with its
/// multiplicity carried by the enclosing `Multiset`.
pub type RowItem = (RecordKey, Row);

/// What every operator consumes and produces: a batch of keyed-record
/// deltas for one tick.
pub type RowMultiset = Multiset<RowItem>;

/// A unary dataflow operator: `map`, `filter`, `distinct`, `groupBy`,
/// `topK` are all single-input.
pub trait UnaryOperator: Send {
    fn step(&mut self, input: RowMultiset) -> RowMultiset;
}

/// A binary dataflow operator: only `join` is binary.
pub trait BinaryOperator: Send {
    fn step(&mut self, left: RowMultiset, right: RowMultiset) -> RowMultiset;
}
