//! The keyed collection store (spec §4.8): `get`/`has`/`forEach`/`size`/
//! `toArray`, transactional `begin`/`write`/`commit`, and
//! `subscribeChanges`.
//!
//! Grounded on the teacher's storage/reactive split: `CollectionCore`
//! plays the role of the teacher's `crates/storage` keyed table, and its
//! commit path notifies through a [`SubscriptionManager`] exactly the way
//! `crates/reactive`'s store wires a `ChangeSet` out to subscribers — the
//! difference is this store is the mutation boundary itself rather than a
//! downstream observer of one.

use hashbrown::HashMap;
use rq_core::{RecordKey, Row};
use tracing::{debug, warn};

use crate::change::{collapse_batch, Change, ChangeKind};
use crate::subscription::{ChangeCallback, StatusCallback, SubscriptionId, SubscriptionManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    LoadingSubset,
    Ready,
    Error,
    CleanedUp,
}

/// What a [`SyncAdapter`]'s `load_subset` hands back. An adapter can
/// satisfy a request synchronously (already has the rows in memory, or
/// reads from a local source) or defer it — in which case the adapter is
/// responsible for calling the matching [`crate::subset_dedup::SubsetDeduper`]
/// resolution once its own out-of-band fetch completes. This crate has no
/// async runtime dependency; a `Pending` outcome is a push, not a future.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Satisfied,
    Pending,
}

/// The side a collection presents to the thing that keeps it in sync with
/// an upstream source (a server, another collection, a local generator).
/// Split out from [`Collection`] so `start`/`load_subset` can take
/// `&mut CollectionCore` without also needing `&mut self.adapter` borrowed
/// at the same time — see `Collection::new`/`load_subset` for the split
/// borrow this enables.
pub trait SyncAdapter: Send {
    fn start(&mut self, core: &mut CollectionCore);

    fn load_subset(
        &mut self,
        _core: &mut CollectionCore,
        _options: &crate::subset_dedup::LoadSubsetOptions,
    ) -> LoadOutcome {
        LoadOutcome::Satisfied
    }
}

/// A [`SyncAdapter`] that never talks to anything; a collection built
/// entirely from local `write` calls (a derived/union collection, a test
/// fixture) uses this.
#[derive(Default)]
pub struct NoopAdapter;

impl SyncAdapter for NoopAdapter {
    fn start(&mut self, core: &mut CollectionCore) {
        core.mark_ready();
    }
}

pub struct CollectionCore {
    pub id: String,
    data: HashMap<RecordKey, Row>,
    status: Status,
    subscriptions: SubscriptionManager,
    staged: Vec<Change>,
    in_transaction: bool,
}

impl CollectionCore {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: HashMap::new(),
            status: Status::Idle,
            subscriptions: SubscriptionManager::new(),
            staged: Vec::new(),
            in_transaction: false,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        if self.status == status {
            return;
        }
        debug!(collection = %self.id, ?status, "collection status changed");
        self.status = status;
        self.subscriptions.notify_status(status);
    }

    pub fn mark_ready(&mut self) {
        self.set_status(Status::Ready);
    }

    pub fn begin(&mut self) {
        if self.in_transaction {
            warn!(collection = %self.id, "begin called while already inside a transaction");
        }
        self.in_transaction = true;
    }

    pub fn write(&mut self, change: Change) {
        if !self.in_transaction {
            warn!(collection = %self.id, "write called outside of a begin/commit transaction");
        }
        self.staged.push(change);
    }

    /// Applies the staged batch, collapsing duplicate per-key writes, then
    /// notifies subscribers with exactly the writes that took effect. A
    /// batch that collapses to nothing notifies no one.
    pub fn commit(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.in_transaction = false;
        let collapsed = collapse_batch(staged);
        let mut batch = Vec::with_capacity(collapsed.len());
        for change in collapsed {
            let previous = self.data.get(&change.key).cloned();
            match change.kind {
                ChangeKind::Insert | ChangeKind::Update => {
                    if let Some(value) = &change.value {
                        self.data.insert(change.key.clone(), value.clone());
                    }
                }
                ChangeKind::Delete => {
                    self.data.remove(&change.key);
                }
            }
            batch.push(change.with_previous(previous));
        }
        self.subscriptions.notify_changes(&batch);
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Row> {
        self.data.get(key)
    }

    pub fn has(&self, key: &RecordKey) -> bool {
        self.data.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn for_each(&self, mut f: impl FnMut(&RecordKey, &Row)) {
        for (k, v) in &self.data {
            f(k, v);
        }
    }

    pub fn to_array(&self) -> Vec<Row> {
        self.data.values().cloned().collect()
    }

    /// The current state rendered as a batch of inserts, for a subscriber
    /// that asked to see existing rows before future changes.
    pub fn current_state_as_changes(&self) -> Vec<Change> {
        self.data
            .iter()
            .map(|(k, v)| Change::insert(k.clone(), v.clone()))
            .collect()
    }

    pub fn subscribe_changes(
        &mut self,
        include_initial_state: bool,
        mut callback: ChangeCallback,
    ) -> SubscriptionId {
        if include_initial_state {
            let initial = self.current_state_as_changes();
            if !initial.is_empty() {
                callback(&initial);
            }
        }
        self.subscriptions.subscribe_changes(callback)
    }

    /// Registers `callback` and immediately replays the current status,
    /// so a subscriber doesn't have to guess whether it missed a
    /// transition that already happened before it subscribed.
    pub fn subscribe_status(&mut self, mut callback: StatusCallback) -> SubscriptionId {
        callback(self.status);
        self.subscriptions.subscribe_status(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    pub fn clean_up(&mut self) {
        self.set_status(Status::CleanedUp);
        self.subscriptions.clear();
        self.data.clear();
    }
}

pub struct Collection<A: SyncAdapter> {
    pub core: CollectionCore,
    pub deduper: crate::subset_dedup::SubsetDeduper,
    adapter: A,
}

impl<A: SyncAdapter> Collection<A> {
    pub fn new(id: impl Into<String>, mut adapter: A) -> Self {
        let mut core = CollectionCore::new(id);
        adapter.start(&mut core);
        Self { core, deduper: crate::subset_dedup::SubsetDeduper::new(), adapter }
    }

    /// Runs `options` through the subset deduper; only calls into the
    /// adapter when the deduper decides the request (or its residual) is
    /// actually new coverage.
    pub fn load_subset(&mut self, options: crate::subset_dedup::LoadSubsetOptions) -> LoadOutcome {
        let Collection { core, deduper, adapter } = self;
        deduper.request(core, adapter, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::Value;

    fn row_with(field: &str, value: Value) -> Row {
        let mut r = Row::new();
        r.set(field, value);
        r
    }

    #[test]
    fn commit_applies_writes_and_get_reflects_them() {
        let mut col = Collection::new("users", NoopAdapter);
        col.core.begin();
        col.core.write(Change::insert(RecordKey::Int(1), row_with("name", Value::from("ada"))));
        col.core.commit();
        assert!(col.core.has(&RecordKey::Int(1)));
        assert_eq!(col.core.size(), 1);
    }

    #[test]
    fn subscribe_with_initial_state_replays_existing_rows_once() {
        let mut col = Collection::new("users", NoopAdapter);
        col.core.begin();
        col.core.write(Change::insert(RecordKey::Int(1), Row::new()));
        col.core.commit();

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        col.core.subscribe_changes(
            true,
            Box::new(move |batch| seen2.lock().unwrap().push(batch.len())),
        );
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        col.core.begin();
        col.core.write(Change::delete(RecordKey::Int(1)));
        col.core.commit();
        assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
        assert!(!col.core.has(&RecordKey::Int(1)));
    }

    #[test]
    fn empty_commit_does_not_notify_subscribers() {
        let mut col = Collection::new("users", NoopAdapter);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(0));
        let seen2 = seen.clone();
        col.core.subscribe_changes(false, Box::new(move |batch| *seen2.lock().unwrap() += batch.len()));
        col.core.begin();
        col.core.commit();
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
