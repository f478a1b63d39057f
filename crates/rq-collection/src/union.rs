//! Cross-collection union (spec §4.11): merges the writes of several
//! source collections into one keyed store, rejecting a write for a key
//! already owned by a different source, and gating readiness on every
//! known source reaching `Ready`.
//!
//! Wiring a union to its sources needs shared mutable access from inside
//! a `'static` subscription callback — the same problem the teacher
//! solves in its reactive store with interior mutability — so a union is
//! built to live behind an `Arc<Mutex<_>>` rather than be owned outright
//! by one of its sources.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use rq_core::RecordKey;
use tracing::warn;

use crate::change::{Change, ChangeKind};
use crate::collection::{CollectionCore, Status};
use crate::subscription::SubscriptionId;

pub struct UnionCollection {
    pub core: CollectionCore,
    key_owner: HashMap<RecordKey, String>,
    known_sources: HashSet<String>,
    ready_sources: HashSet<String>,
}

impl UnionCollection {
    pub fn new(id: impl Into<String>) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            core: crate::collection::Collection::new(id, crate::collection::NoopAdapter).core,
            key_owner: HashMap::new(),
            known_sources: HashSet::new(),
            ready_sources: HashSet::new(),
        }))
    }

    /// Subscribes to `source`'s changes and status, folding its writes
    /// into this union under `source_id`'s ownership. Returns the two
    /// subscription ids so the caller can unwind them via
    /// `source.unsubscribe` if it later calls `remove_source`.
    pub fn add_source(
        union: &Arc<Mutex<Self>>,
        source_id: impl Into<String>,
        source: &mut CollectionCore,
    ) -> (SubscriptionId, SubscriptionId) {
        let id = source_id.into();
        {
            let mut u = union.lock().unwrap();
            u.known_sources.insert(id.clone());
            if u.core.status() == Status::Idle {
                u.core.set_status(Status::LoadingSubset);
            }
        }

        let union_for_changes = union.clone();
        let id_for_changes = id.clone();
        let change_sub = source.subscribe_changes(
            true,
            Box::new(move |batch| union_for_changes.lock().unwrap().ingest(&id_for_changes, batch)),
        );

        let union_for_status = union.clone();
        let id_for_status = id;
        let status_sub = source.subscribe_status(Box::new(move |status| {
            union_for_status.lock().unwrap().on_source_status(&id_for_status, status)
        }));

        (change_sub, status_sub)
    }

    /// Applies a source's committed batch, rejecting writes to keys owned
    /// by another source and releasing ownership on delete.
    pub fn ingest(&mut self, source_id: &str, batch: &[Change]) {
        self.core.begin();
        for change in batch {
            match change.kind {
                ChangeKind::Insert | ChangeKind::Update => {
                    if let Some(owner) = self.key_owner.get(&change.key) {
                        if owner != source_id {
                            warn!(
                                key = %change.key,
                                owner,
                                writer = source_id,
                                "union rejected a write to a key owned by another source"
                            );
                            continue;
                        }
                    }
                    self.key_owner.insert(change.key.clone(), source_id.to_string());
                    self.core.write(change.clone());
                }
                ChangeKind::Delete => {
                    if self.key_owner.get(&change.key).map(String::as_str) == Some(source_id) {
                        self.key_owner.remove(&change.key);
                        self.core.write(change.clone());
                    }
                }
            }
        }
        self.core.commit();
    }

    /// Drops every row currently owned by `source_id` and removes it from
    /// the readiness tally, for when a source is dynamically detached.
    pub fn remove_source(&mut self, source_id: &str) {
        self.known_sources.remove(source_id);
        self.ready_sources.remove(source_id);
        let owned: Vec<RecordKey> = self
            .key_owner
            .iter()
            .filter(|(_, owner)| owner.as_str() == source_id)
            .map(|(k, _)| k.clone())
            .collect();
        self.core.begin();
        for key in owned {
            self.key_owner.remove(&key);
            self.core.write(Change::delete(key));
        }
        self.core.commit();
        self.recheck_readiness();
    }

    fn on_source_status(&mut self, source_id: &str, status: Status) {
        match status {
            Status::Ready => {
                self.ready_sources.insert(source_id.to_string());
                self.recheck_readiness();
            }
            Status::Error => self.core.set_status(Status::Error),
            Status::CleanedUp => self.remove_source(source_id),
            Status::Idle | Status::LoadingSubset => {
                self.ready_sources.remove(source_id);
            }
        }
    }

    fn recheck_readiness(&mut self) {
        if !self.known_sources.is_empty() && self.known_sources == self.ready_sources {
            self.core.mark_ready();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Collection, NoopAdapter};
    use rq_core::Row;

    #[test]
    fn a_source_write_is_visible_through_the_union() {
        let union = UnionCollection::new("all-users");
        let mut source = Collection::new("users-a", NoopAdapter);
        UnionCollection::add_source(&union, "a", &mut source.core);

        source.core.begin();
        source.core.write(Change::insert(RecordKey::Int(1), Row::new()));
        source.core.commit();

        assert!(union.lock().unwrap().core.has(&RecordKey::Int(1)));
    }

    #[test]
    fn a_conflicting_key_from_a_second_source_is_rejected() {
        let union = UnionCollection::new("all-users");
        let mut a = Collection::new("users-a", NoopAdapter);
        let mut b = Collection::new("users-b", NoopAdapter);
        UnionCollection::add_source(&union, "a", &mut a.core);
        UnionCollection::add_source(&union, "b", &mut b.core);

        a.core.begin();
        a.core.write(Change::insert(RecordKey::Int(1), Row::new()));
        a.core.commit();

        b.core.begin();
        let mut conflicting = Row::new();
        conflicting.set("owner", rq_core::Value::from("b"));
        b.core.write(Change::insert(RecordKey::Int(1), conflicting));
        b.core.commit();

        let guard = union.lock().unwrap();
        let row = guard.core.get(&RecordKey::Int(1)).unwrap();
        assert!(row.get("owner").is_none());
    }

    #[test]
    fn union_becomes_ready_only_once_every_source_is_ready() {
        let union = UnionCollection::new("all-users");
        let mut a = Collection::new("users-a", NoopAdapter);
        let mut b = Collection::new("users-b", NoopAdapter);
        UnionCollection::add_source(&union, "a", &mut a.core);
        assert_eq!(union.lock().unwrap().core.status(), Status::Ready);

        union.lock().unwrap().known_sources.insert("b".into());
        union.lock().unwrap().core.set_status(Status::LoadingSubset);
        UnionCollection::add_source(&union, "b", &mut b.core);
        assert_eq!(union.lock().unwrap().core.status(), Status::Ready);
    }
}
