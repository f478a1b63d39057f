//! Inspection surface for a [`Database`]: a graph snapshot, a DOT export
//! of it, and trace-root analysis over a query's recorded dependencies
//! (spec §4.12, "devtools"). Mirrors the read-only posture of
//! `rq_dataflow`'s own inspection helpers — nothing here mutates state.

use hashbrown::HashSet;

use crate::engine::{Database, Id, RecomputeEvent};

#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub inputs: Vec<Id>,
    pub queries: Vec<Id>,
    /// `(query, dependency)` edges, one per recorded `DepEdge`.
    pub edges: Vec<(Id, Id)>,
}

impl Database {
    pub fn snapshot(&self) -> GraphSnapshot {
        let inputs = self.all_input_ids();
        let queries = self.all_query_ids();
        let mut edges = Vec::new();
        for &q in &queries {
            for dep in self.dep_ids(q) {
                edges.push((q, dep));
            }
        }
        GraphSnapshot { inputs, queries, edges }
    }

    /// The recompute event log, oldest first.
    pub fn recompute_events(&self) -> &[RecomputeEvent] {
        self.events()
    }

    /// Walks `id`'s recorded dependencies transitively down to the
    /// inputs that, if changed, would eventually invalidate it. Returns
    /// them in discovery order, each appearing once.
    pub fn trace_roots(&self, id: Id) -> Vec<Id> {
        let mut seen: HashSet<Id> = HashSet::new();
        let mut roots = Vec::new();
        let mut stack = self.dep_ids(id);
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep) {
                continue;
            }
            let children = self.dep_ids(dep);
            if children.is_empty() {
                roots.push(dep);
            } else {
                stack.extend(children);
            }
        }
        roots
    }
}

/// Renders a snapshot as Graphviz DOT — inputs as boxes, queries as
/// ovals, edges from a query to whatever it read.
pub fn to_dot(snapshot: &GraphSnapshot) -> String {
    let mut out = String::from("digraph salsa {\n");
    for &id in &snapshot.inputs {
        out.push_str(&format!("  \"{id}\" [shape=box,label=\"input {id}\"];\n"));
    }
    for &id in &snapshot.queries {
        out.push_str(&format!("  \"{id}\" [shape=oval,label=\"query {id}\"];\n"));
    }
    for (from, to) in &snapshot.edges {
        out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::Value;

    const A: Id = 1;
    const B: Id = 2;
    const SUM: Id = 3;

    fn wired_database() -> Database {
        let mut db = Database::new();
        db.set_input(A, Value::Int(1));
        db.set_input(B, Value::Int(2));
        db.query(SUM, |db| {
            let a = db.read_input(A)?.as_i64().unwrap();
            let b = db.read_input(B)?.as_i64().unwrap();
            Ok(Value::Int(a + b))
        })
        .unwrap();
        db
    }

    #[test]
    fn snapshot_lists_every_input_query_and_edge() {
        let db = wired_database();
        let snap = db.snapshot();
        assert_eq!(snap.inputs.len(), 2);
        assert_eq!(snap.queries, vec![SUM]);
        assert_eq!(snap.edges.len(), 2);
    }

    #[test]
    fn dot_export_mentions_every_node() {
        let db = wired_database();
        let dot = to_dot(&db.snapshot());
        assert!(dot.contains("input 1"));
        assert!(dot.contains("input 2"));
        assert!(dot.contains("query 3"));
    }

    #[test]
    fn trace_roots_resolves_a_derived_querys_inputs() {
        let db = wired_database();
        let mut roots = db.trace_roots(SUM);
        roots.sort();
        assert_eq!(roots, vec![A, B]);
    }
}
