//! Salsa-style revision-tracked memoization for scalar derivations (spec
//! §4.12) — a single-threaded cooperative counterpart to the IVM
//! dataflow engine for values that are cheaper to recompute-on-demand
//! than to incrementally maintain.

pub mod devtools;
pub mod engine;

pub use devtools::{to_dot, GraphSnapshot};
pub use engine::{CacheCheck, ChangeCallback, Database, DepEdge, Id, RecomputeEvent, Revision};
