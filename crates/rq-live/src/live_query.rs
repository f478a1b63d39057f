//! Drives a compiled query's dataflow graph against live collection
//! sources and commits its result into a sink collection (spec §4.10).
//!
//! The main pipeline and each `includes` child already share one
//! `DataflowGraph` (rq-compiler wires a child as an inner join against
//! its parent's key stream into the same graph) — what's left for this
//! layer is the nesting itself: nothing in the graph merges a child's
//! rows into its parent's `field_name`. That assembly step recomputes
//! and re-diffs the affected parent rows each tick, the same
//! recompute-and-diff idiom `GroupByOperator`/`TopKOperator` use for
//! their own per-tick materialization.

use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};
use rq_collection::{Change, CollectionCore, NoopAdapter, Status};
use rq_compiler::{compile, CompiledInclude, CompiledPipeline};
use rq_core::{RecordKey, Result, Row, Value};
use rq_dataflow::{DataflowGraph, NodeId, RowMultiset};
use rq_ir::{QueryNode, RefPath};
use rq_multiset::Index;
use tracing::debug;

use crate::registry::CollectionRegistry;
use crate::resolver::LiveResolver;

struct IncludeAssembly {
    field_name: String,
    output_node: NodeId,
    correlation_field: RefPath,
    child_correlation_field: RefPath,
    materialize_as_array: bool,
    child_rows: Index<Value, (RecordKey, Row)>,
}

impl IncludeAssembly {
    /// Sums multiplicities per child record key — a row's retraction
    /// always carries the same content it was inserted with, so a key
    /// with a positive net count is present with whichever row content
    /// was first accumulated for it — the same consolidation
    /// `GroupByOperator::consolidated_group` does for its own index.
    fn consolidated_children(&self, corr_value: &Value) -> Vec<(RecordKey, Row)> {
        let mut counts: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for ((rk, row), m) in self.child_rows.get_iterator(corr_value) {
            let entry = counts.entry(rk.clone()).or_insert_with(|| (row.clone(), 0));
            entry.1 += m;
        }
        let mut rows: Vec<(RecordKey, Row)> = counts
            .into_iter()
            .filter(|(_, (_, m))| *m > 0)
            .map(|(rk, (row, _))| (rk, row))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    fn nested_value(&self, corr_value: &Value) -> Value {
        let rows = self.consolidated_children(corr_value);
        if self.materialize_as_array {
            Value::Array(rows.into_iter().map(|(_, r)| r.into_value()).collect())
        } else {
            rows.into_iter().next().map(|(_, r)| r.into_value()).unwrap_or(Value::Null)
        }
    }
}

/// A single compiled query, wired to its sources, producing a
/// continuously-maintained result collection.
///
/// Lives behind `Arc<Mutex<_>>` because its tick loop is driven from
/// subscription callbacks registered on its source collections, the same
/// shared-mutability need `rq_collection::UnionCollection` has.
pub struct LiveQuery {
    pub sink: CollectionCore,
    graph: DataflowGraph,
    feeds: Vec<(NodeId, Arc<Mutex<RowMultiset>>)>,
    main_output: NodeId,
    includes: Vec<IncludeAssembly>,
    parent_rows: HashMap<RecordKey, Row>,
    parent_corr_by_key: HashMap<RecordKey, Vec<Value>>,
    parent_keys_by_corr: Vec<HashMap<Value, HashSet<RecordKey>>>,
    last_emitted: HashMap<RecordKey, Row>,
    known_sources: HashSet<String>,
    ready_sources: HashSet<String>,
}

impl LiveQuery {
    pub fn compile(query: &QueryNode, registry: &mut CollectionRegistry, sink_id: impl Into<String>) -> Result<Arc<Mutex<Self>>> {
        let mut graph = DataflowGraph::new();
        let mut resolver = LiveResolver::new(registry);
        let compiled: CompiledPipeline = compile(query, &mut graph, &mut resolver)?;
        graph.finalize();
        let feeds = resolver.into_feeds();

        let known_sources: HashSet<String> = compiled.alias_to_collection_id.values().cloned().collect();
        let includes: Vec<IncludeAssembly> = compiled
            .includes
            .into_iter()
            .map(|inc: CompiledInclude| IncludeAssembly {
                field_name: inc.field_name,
                output_node: inc.child.output_node,
                correlation_field: inc.correlation_field,
                child_correlation_field: inc.child_correlation_field,
                materialize_as_array: inc.materialize_as_array,
                child_rows: Index::new(),
            })
            .collect();
        let parent_keys_by_corr = includes.iter().map(|_| HashMap::new()).collect();

        let live = Self {
            sink: rq_collection::Collection::new(sink_id, NoopAdapter).core,
            graph,
            feeds,
            main_output: compiled.output_node,
            includes,
            parent_rows: HashMap::new(),
            parent_corr_by_key: HashMap::new(),
            parent_keys_by_corr,
            last_emitted: HashMap::new(),
            known_sources,
            ready_sources: HashSet::new(),
        };
        Ok(Arc::new(Mutex::new(live)))
    }

    /// Registers this live query's readiness against every source
    /// collection it depends on; the sink becomes `Ready` only once all
    /// of them are.
    pub fn gate_readiness(live: &Arc<Mutex<Self>>, sources: Vec<(&str, &mut CollectionCore)>) {
        for (id, core) in sources {
            if !live.lock().unwrap().known_sources.contains(id) {
                continue;
            }
            let live_for_status = live.clone();
            let id = id.to_string();
            core.subscribe_status(Box::new(move |status| {
                live_for_status.lock().unwrap().on_source_status(&id, status)
            }));
        }
    }

    fn on_source_status(&mut self, source_id: &str, status: Status) {
        match status {
            Status::Ready => {
                self.ready_sources.insert(source_id.to_string());
                if self.known_sources == self.ready_sources {
                    self.sink.mark_ready();
                }
            }
            Status::Error => self.sink.set_status(Status::Error),
            Status::Idle | Status::LoadingSubset | Status::CleanedUp => {
                self.ready_sources.remove(source_id);
            }
        }
    }

    /// Drains every source feed, runs one graph tick, folds include
    /// deltas into their persistent indices, and commits the
    /// re-assembled rows for every parent key touched this tick.
    pub fn tick(&mut self) {
        let mut source_inputs: HashMap<NodeId, RowMultiset> = HashMap::new();
        for (node, feed) in &self.feeds {
            let mut buf = feed.lock().unwrap();
            if !buf.is_empty() {
                source_inputs.insert(*node, std::mem::take(&mut *buf));
            }
        }
        if source_inputs.is_empty() {
            return;
        }
        let outputs = self.graph.run(&source_inputs);
        debug!(nodes = outputs.len(), "live query tick");

        let mut touched: HashSet<RecordKey> = HashSet::new();

        if let Some(delta) = outputs.get(&self.main_output) {
            for ((key, row), mult) in delta.iter() {
                self.apply_main_delta(key.clone(), row.clone(), *mult);
                touched.insert(key.clone());
            }
        }

        for idx in 0..self.includes.len() {
            let Some(delta) = outputs.get(&self.includes[idx].output_node).cloned() else { continue };
            for ((key, row), mult) in delta.into_iter() {
                let corr = row
                    .get_path(&self.includes[idx].child_correlation_field.as_slice())
                    .cloned()
                    .unwrap_or(Value::Null);
                self.includes[idx].child_rows.add_value(corr.clone(), (key, row), mult);
                if let Some(keys) = self.parent_keys_by_corr[idx].get(&corr) {
                    touched.extend(keys.iter().cloned());
                }
            }
        }

        self.sink.begin();
        for key in touched {
            match self.parent_rows.get(&key) {
                Some(base) => {
                    let assembled = self.assemble(&key, base.clone());
                    let changed = self.last_emitted.get(&key) != Some(&assembled);
                    if changed {
                        if self.last_emitted.remove(&key).is_some() {
                            self.sink.write(Change::update(key.clone(), assembled.clone()));
                        } else {
                            self.sink.write(Change::insert(key.clone(), assembled.clone()));
                        }
                        self.last_emitted.insert(key, assembled);
                    }
                }
                None => {
                    if self.last_emitted.remove(&key).is_some() {
                        self.sink.write(Change::delete(key));
                    }
                }
            }
        }
        self.sink.commit();
    }

    fn apply_main_delta(&mut self, key: RecordKey, row: Row, mult: i64) {
        if mult > 0 {
            let corr_values: Vec<Value> = self
                .includes
                .iter()
                .map(|inc| row.get_path(&inc.correlation_field.as_slice()).cloned().unwrap_or(Value::Null))
                .collect();
            for (idx, corr) in corr_values.iter().enumerate() {
                self.parent_keys_by_corr[idx].entry(corr.clone()).or_default().insert(key.clone());
            }
            self.parent_corr_by_key.insert(key.clone(), corr_values);
            self.parent_rows.insert(key, row);
        } else if mult < 0 {
            if let Some(corr_values) = self.parent_corr_by_key.remove(&key) {
                for (idx, corr) in corr_values.iter().enumerate() {
                    if let Some(keys) = self.parent_keys_by_corr[idx].get_mut(corr) {
                        keys.remove(&key);
                    }
                }
            }
            self.parent_rows.remove(&key);
        }
    }

    fn assemble(&self, key: &RecordKey, base: Row) -> Row {
        let mut out = base;
        if let Some(corr_values) = self.parent_corr_by_key.get(key) {
            for (inc, corr) in self.includes.iter().zip(corr_values) {
                out.set(inc.field_name.clone(), inc.nested_value(corr));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_collection::{Collection, NoopAdapter as CollNoop};
    use rq_ir::{Expr, FromClause};

    #[test]
    fn a_plain_query_forwards_source_rows_into_the_sink() {
        let mut registry = CollectionRegistry::new();
        let mut users = Collection::new("users", CollNoop);
        registry.register("users", &mut users.core);

        let q = QueryNode::new("u", FromClause::Collection("users".into()));
        let live = LiveQuery::compile(&q, &mut registry, "out").unwrap();

        users.core.begin();
        let mut row = Row::new();
        row.set("name", Value::from("ada"));
        users.core.write(Change::insert(RecordKey::Int(1), row));
        users.core.commit();

        live.lock().unwrap().tick();
        assert!(live.lock().unwrap().sink.has(&RecordKey::Int(1)));
    }

    #[test]
    fn retracting_a_source_row_removes_it_from_the_sink() {
        let mut registry = CollectionRegistry::new();
        let mut users = Collection::new("users", CollNoop);
        registry.register("users", &mut users.core);
        let q = QueryNode::new("u", FromClause::Collection("users".into()));
        let live = LiveQuery::compile(&q, &mut registry, "out").unwrap();

        users.core.begin();
        users.core.write(Change::insert(RecordKey::Int(1), Row::new()));
        users.core.commit();
        live.lock().unwrap().tick();
        assert!(live.lock().unwrap().sink.has(&RecordKey::Int(1)));

        users.core.begin();
        users.core.write(Change::delete(RecordKey::Int(1)));
        users.core.commit();
        live.lock().unwrap().tick();
        assert!(!live.lock().unwrap().sink.has(&RecordKey::Int(1)));
    }

    #[test]
    fn a_filtered_out_row_never_reaches_the_sink() {
        let mut registry = CollectionRegistry::new();
        let mut users = Collection::new("users", CollNoop);
        registry.register("users", &mut users.core);

        let mut q = QueryNode::new("u", FromClause::Collection("users".into()));
        q.where_clauses.push(Expr::func("eq", vec![Expr::ref_path(["u", "active"]), Expr::val(true)]));
        let live = LiveQuery::compile(&q, &mut registry, "out").unwrap();

        users.core.begin();
        let mut inactive = Row::new();
        inactive.set("active", Value::Bool(false));
        users.core.write(Change::insert(RecordKey::Int(1), inactive));
        users.core.commit();

        live.lock().unwrap().tick();
        assert_eq!(live.lock().unwrap().sink.size(), 0);
    }
}
