//! Compiles a relational IR query into a wired `rq_dataflow::DataflowGraph`
//! (spec §4.7).
//!
//! Grounded on the teacher's `crates/query/src/planner` and `executor`
//! modules, which likewise walk a validated AST into an executable
//! plan — rebuilt here to target a persistent dataflow graph instead of
//! a one-shot row iterator, since every operator here must keep running
//! state across ticks.

pub mod compile;
pub mod eval;

pub use compile::{compile, CollectionResolver, CompiledInclude, CompiledPipeline};
