//! Maps collection ids to the accumulating delta buffer a live query's
//! source node reads from each tick.
//!
//! There's no teacher file this is grounded on — the teacher's `query`
//! crate plans against a dataset handed to it directly, it never wires a
//! compiled plan to a live, independently-updating store. This plays the
//! role the spec assigns a runtime's collection registry: the thing a
//! `CollectionResolver` consults to turn a collection id into a stream.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use rq_collection::{Change, CollectionCore};
use rq_dataflow::RowMultiset;
use tracing::warn;

/// Turns one committed [`Change`] into the dataflow deltas it represents.
/// An update retracts the row's previous value and inserts its new one;
/// a delete retracts only. A change with no recorded `previous` (the
/// initial-state replay, or an insert into a fresh key) contributes no
/// retraction — there was nothing to retract.
pub fn append_change_deltas(buffer: &mut RowMultiset, change: &Change) {
    if let Some(previous) = &change.previous {
        buffer.push((change.key.clone(), previous.clone()), -1);
    }
    if let Some(value) = &change.value {
        buffer.push((change.key.clone(), value.clone()), 1);
    }
}

#[derive(Default)]
pub struct CollectionRegistry {
    feeds: HashMap<String, Arc<Mutex<RowMultiset>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `core`'s committed batches, translating each into
    /// dataflow deltas accumulated in a buffer any number of live queries
    /// can later drain from via [`Self::feed`].
    pub fn register(&mut self, id: impl Into<String>, core: &mut CollectionCore) {
        let id = id.into();
        let buffer: Arc<Mutex<RowMultiset>> = Arc::new(Mutex::new(RowMultiset::default()));
        let buffer_for_sub = buffer.clone();
        core.subscribe_changes(
            true,
            Box::new(move |batch| {
                let mut guard = buffer_for_sub.lock().unwrap();
                for change in batch {
                    append_change_deltas(&mut guard, change);
                }
            }),
        );
        self.feeds.insert(id, buffer);
    }

    /// Returns the feed for `id`, creating an empty one that is never fed
    /// if the collection hasn't been registered yet — a query compiled
    /// against an unknown collection id still gets a graph, it just never
    /// sees any rows until the collection is registered.
    pub fn feed(&mut self, id: &str) -> Arc<Mutex<RowMultiset>> {
        if !self.feeds.contains_key(id) {
            warn!(collection = id, "live query referenced a collection that isn't registered yet");
            self.feeds.insert(id.to_string(), Arc::new(Mutex::new(RowMultiset::default())));
        }
        self.feeds[id].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_collection::{Collection, NoopAdapter};
    use rq_core::{RecordKey, Row};

    #[test]
    fn registering_a_collection_feeds_its_committed_writes() {
        let mut registry = CollectionRegistry::new();
        let mut col = Collection::new("users", NoopAdapter);
        registry.register("users", &mut col.core);

        col.core.begin();
        col.core.write(Change::insert(RecordKey::Int(1), Row::new()));
        col.core.commit();

        let feed = registry.feed("users");
        let guard = feed.lock().unwrap();
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn an_unregistered_collection_yields_an_empty_feed_instead_of_panicking() {
        let mut registry = CollectionRegistry::new();
        let feed = registry.feed("missing");
        assert!(feed.lock().unwrap().is_empty());
    }
}
