//! Broadcast of committed batches and status transitions to a collection's
//! subscribers, adapted from the teacher's
//! `crates/reactive/src/subscription.rs` `SubscriptionManager` — same
//! id/callback/active bookkeeping, generalized to carry a `&[Change]`
//! batch instead of a `ChangeSet` and to add the status side-channel
//! spec §4.8's `onStatusChange` needs.

use hashbrown::HashMap;

use crate::change::Change;
use crate::collection::Status;

pub type SubscriptionId = u64;
pub type ChangeCallback = Box<dyn FnMut(&[Change]) + Send>;
pub type StatusCallback = Box<dyn FnMut(Status) + Send>;

struct ChangeSubscription {
    callback: ChangeCallback,
    active: bool,
}

struct StatusSubscription {
    callback: StatusCallback,
    active: bool,
}

#[derive(Default)]
pub struct SubscriptionManager {
    changes: HashMap<SubscriptionId, ChangeSubscription>,
    statuses: HashMap<SubscriptionId, StatusSubscription>,
    next_id: SubscriptionId,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn subscribe_changes(&mut self, callback: ChangeCallback) -> SubscriptionId {
        let id = self.allocate_id();
        self.changes.insert(id, ChangeSubscription { callback, active: true });
        id
    }

    pub fn subscribe_status(&mut self, callback: StatusCallback) -> SubscriptionId {
        let id = self.allocate_id();
        self.statuses.insert(id, StatusSubscription { callback, active: true });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(s) = self.changes.get_mut(&id) {
            s.active = false;
        }
        if let Some(s) = self.statuses.get_mut(&id) {
            s.active = false;
        }
        self.changes.remove(&id);
        self.statuses.remove(&id);
    }

    pub fn notify_changes(&mut self, batch: &[Change]) {
        if batch.is_empty() {
            return;
        }
        for sub in self.changes.values_mut() {
            if sub.active {
                (sub.callback)(batch);
            }
        }
    }

    pub fn notify_status(&mut self, status: Status) {
        for sub in self.statuses.values_mut() {
            if sub.active {
                (sub.callback)(status);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.statuses.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.statuses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::RecordKey;
    use std::sync::{Arc, Mutex};

    #[test]
    fn notify_changes_delivers_the_batch_to_every_active_subscriber() {
        let mut mgr = SubscriptionManager::new();
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        mgr.subscribe_changes(Box::new(move |batch| {
            *seen2.lock().unwrap() += batch.len();
        }));
        mgr.notify_changes(&[Change::insert(RecordKey::Int(1), rq_core::Row::new())]);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribed_callbacks_stop_receiving_notifications() {
        let mut mgr = SubscriptionManager::new();
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        let id = mgr.subscribe_changes(Box::new(move |_| {
            *seen2.lock().unwrap() += 1;
        }));
        mgr.unsubscribe(id);
        mgr.notify_changes(&[Change::insert(RecordKey::Int(1), rq_core::Row::new())]);
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
