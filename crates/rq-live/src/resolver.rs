//! A [`rq_compiler::CollectionResolver`] backed by a [`CollectionRegistry`]:
//! each distinct collection id referenced by a query gets exactly one
//! graph source node, reused across repeated references to the same id
//! within one compile (the shape a self-join needs).

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use rq_compiler::CollectionResolver;
use rq_dataflow::{DataflowGraph, NodeId, RowMultiset};

use crate::registry::CollectionRegistry;

pub struct LiveResolver<'a> {
    registry: &'a mut CollectionRegistry,
    resolved: HashMap<String, NodeId>,
    feeds: Vec<(NodeId, Arc<Mutex<RowMultiset>>)>,
}

impl<'a> LiveResolver<'a> {
    pub fn new(registry: &'a mut CollectionRegistry) -> Self {
        Self { registry, resolved: HashMap::new(), feeds: Vec::new() }
    }

    /// Consumes the resolver, handing back the `(node, feed)` pairs a
    /// live query's tick loop drains from.
    pub fn into_feeds(self) -> Vec<(NodeId, Arc<Mutex<RowMultiset>>)> {
        self.feeds
    }
}

impl CollectionResolver for LiveResolver<'_> {
    fn resolve(&mut self, graph: &mut DataflowGraph, collection_id: &str) -> NodeId {
        if let Some(&node) = self.resolved.get(collection_id) {
            return node;
        }
        let node = graph.add_source();
        let feed = self.registry.feed(collection_id);
        self.resolved.insert(collection_id.to_string(), node);
        self.feeds.push((node, feed));
        node
    }
}
