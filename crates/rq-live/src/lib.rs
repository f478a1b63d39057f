//! Live query assembly (spec §4.10): wires a compiled query's dataflow
//! graph to registered collection sources and maintains a result sink.

pub mod live_query;
pub mod registry;
pub mod resolver;

pub use live_query::LiveQuery;
pub use registry::CollectionRegistry;
pub use resolver::LiveResolver;
