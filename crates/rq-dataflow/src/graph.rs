//! The dataflow graph: operators connected by writer→reader edges,
//! run one wavefront per tick in topological order (spec §4.2, §9).
//!
//! Nodes can only reference already-added node ids as inputs, so
//! insertion order is always a valid topological order — `run()` walks
//! node ids in ascending order rather than computing a separate sort,
//! the same simplification the teacher's `DataflowGraph` makes for its
//! (non-reader/writer-edge) table-dependency graph.

use crate::{BinaryOperator, RowMultiset, UnaryOperator};
use hashbrown::HashMap;

pub type NodeId = u32;

enum NodeKind {
    /// An entry point fed directly by a collection's input stream.
    Source,
    Unary { input: NodeId, op: Box<dyn UnaryOperator> },
    Binary { left: NodeId, right: NodeId, op: Box<dyn BinaryOperator> },
}

pub struct DataflowGraph {
    next_id: NodeId,
    nodes: HashMap<NodeId, NodeKind>,
    finalized: bool,
}

impl Default for DataflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DataflowGraph {
    pub fn new() -> Self {
        Self { next_id: 0, nodes: HashMap::new(), finalized: false }
    }

    fn alloc(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds a source node; its value for a given tick is supplied to
    /// `run()` directly.
    pub fn add_source(&mut self) -> NodeId {
        assert!(!self.finalized, "cannot add nodes after finalize()");
        let id = self.alloc();
        self.nodes.insert(id, NodeKind::Source);
        id
    }

    pub fn add_unary(&mut self, input: NodeId, op: Box<dyn UnaryOperator>) -> NodeId {
        assert!(!self.finalized, "cannot add nodes after finalize()");
        let id = self.alloc();
        self.nodes.insert(id, NodeKind::Unary { input, op });
        id
    }

    pub fn add_binary(
        &mut self,
        left: NodeId,
        right: NodeId,
        op: Box<dyn BinaryOperator>,
    ) -> NodeId {
        assert!(!self.finalized, "cannot add nodes after finalize()");
        let id = self.alloc();
        self.nodes.insert(id, NodeKind::Binary { left, right, op });
        id
    }

    /// Freezes the topology; no further nodes can be added.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs one tick: `source_inputs` supplies the delta for each source
    /// node; every node's output for this tick is returned, keyed by
    /// node id, so callers can read the terminal node's output.
    pub fn run(&mut self, source_inputs: &HashMap<NodeId, RowMultiset>) -> HashMap<NodeId, RowMultiset> {
        let _span = tracing::debug_span!("dataflow_tick", nodes = self.nodes.len()).entered();
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();

        let mut outputs: HashMap<NodeId, RowMultiset> = HashMap::with_capacity(ids.len());
        for id in ids {
            let output = match self.nodes.get_mut(&id).expect("node exists") {
                NodeKind::Source => source_inputs.get(&id).cloned().unwrap_or_default(),
                NodeKind::Unary { input, op } => {
                    let in_ms = outputs.get(input).cloned().unwrap_or_default();
                    op.step(in_ms)
                }
                NodeKind::Binary { left, right, op } => {
                    // Both inputs are fully materialized before the binary
                    // operator runs (spec §4.2: "drain both inputs before
                    // producing").
                    let l = outputs.get(left).cloned().unwrap_or_default();
                    let r = outputs.get(right).cloned().unwrap_or_default();
                    op.step(l, r)
                }
            };
            outputs.insert(id, output);
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::filter::FilterOperator;
    use rq_core::Value;

    #[test]
    fn graph_runs_nodes_in_insertion_order_and_wires_edges() {
        let mut graph = DataflowGraph::new();
        let src = graph.add_source();
        let filtered = graph.add_unary(
            src,
            Box::new(FilterOperator::new(|_, row| {
                row.get("active").map(|v| v.is_truthy()).unwrap_or(false)
            })),
        );
        graph.finalize();

        let mut row_active = rq_core::Row::new();
        row_active.set("active", Value::Bool(true));
        let mut row_inactive = rq_core::Row::new();
        row_inactive.set("active", Value::Bool(false));

        let mut inputs = HashMap::new();
        let mut ms = crate::RowMultiset::new();
        ms.push((rq_core::RecordKey::Int(1), row_active), 1);
        ms.push((rq_core::RecordKey::Int(2), row_inactive), 1);
        inputs.insert(src, ms);

        let outputs = graph.run(&inputs);
        assert_eq!(outputs[&filtered].len(), 1);
    }
}
