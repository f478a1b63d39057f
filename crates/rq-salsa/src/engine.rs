//! The revision-tracked memoization engine itself (spec §4.12).
//!
//! Vocabulary borrowed from `gluon-salsa`'s `Runtime` (`examples/
//! rowanfr-gluon-salsa/src/runtime.rs`) — revisions, dependency edges,
//! an execution-context stack — stripped of its `RuntimeId`/fork/
//! cancellation machinery, which exists there to support a
//! multi-threaded query database. This engine answers to a single
//! cooperative executor (spec §5), so one `Database`, one stack, no
//! locks.

use hashbrown::HashMap;
use rq_core::{Error, Result, Value};
use tracing::trace;

pub type Id = u64;
pub type Revision = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepEdge {
    pub id: Id,
    pub at_revision: Revision,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheCheck {
    Fresh,
    Stale(String),
    Missing,
}

struct InputSlot {
    value: Value,
    revision: Revision,
}

#[derive(Clone)]
struct MemoEntry {
    value: Value,
    revision: Revision,
    deps: Vec<DepEdge>,
}

#[derive(Default)]
struct QuerySlot {
    memo: Option<MemoEntry>,
}

pub type ChangeCallback = Box<dyn FnMut(&Value) + Send>;

/// One successful recompute, kept for devtools' event stream and
/// trace-root analysis.
#[derive(Clone, Debug)]
pub struct RecomputeEvent {
    pub id: Id,
    pub revision: Revision,
    pub dep_count: usize,
}

#[derive(Default)]
pub struct Database {
    revision: Revision,
    inputs: HashMap<Id, InputSlot>,
    queries: HashMap<Id, QuerySlot>,
    /// Ids of queries currently executing, innermost last — used for
    /// cycle detection and to know which frame a read should record into.
    stack: Vec<Id>,
    /// One dependency accumulator per active stack frame.
    recording: Vec<Vec<DepEdge>>,
    subscribers: HashMap<Id, Vec<ChangeCallback>>,
    events: Vec<RecomputeEvent>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn events(&self) -> &[RecomputeEvent] {
        &self.events
    }

    /// Writes an input's value. A no-op if the new value equals the
    /// current one — the global revision only advances on an actual
    /// change, so an unrelated input write never invalidates memos that
    /// don't depend on it.
    pub fn set_input(&mut self, id: Id, value: Value) {
        let changed = self.inputs.get(&id).map(|slot| slot.value != value).unwrap_or(true);
        if !changed {
            return;
        }
        self.revision += 1;
        trace!(id, revision = self.revision, "salsa input changed");
        self.inputs.insert(id, InputSlot { value, revision: self.revision });
    }

    /// Reads an input, recording a dependency edge from the active query
    /// context (if any) to it at its current revision.
    pub fn read_input(&mut self, id: Id) -> Result<Value> {
        let slot = self.inputs.get(&id).ok_or_else(|| Error::NotFound(format!("salsa input {id}")))?;
        let (value, revision) = (slot.value.clone(), slot.revision);
        self.record_dep(id, revision);
        Ok(value)
    }

    fn record_dep(&mut self, id: Id, at_revision: Revision) {
        if self.stack.last() == Some(&id) {
            return;
        }
        if let Some(edges) = self.recording.last_mut() {
            edges.push(DepEdge { id, at_revision });
        }
    }

    fn current_revision_of(&self, id: Id) -> Revision {
        if let Some(input) = self.inputs.get(&id) {
            return input.revision;
        }
        match self.queries.get(&id).and_then(|q| q.memo.as_ref()) {
            Some(memo) => memo.revision,
            // A dependency that no longer has a memo (evicted, or never
            // computed) can't be proven fresh — treat it as having just
            // changed so the dependent recomputes.
            None => Revision::MAX,
        }
    }

    /// Whether `id`'s memo (if any) is still valid: every recorded
    /// dependency's current revision must not have advanced past the
    /// revision it was read at.
    pub fn check_stale(&self, id: Id) -> CacheCheck {
        let Some(memo) = self.queries.get(&id).and_then(|q| q.memo.as_ref()) else {
            return CacheCheck::Missing;
        };
        for dep in &memo.deps {
            let current = self.current_revision_of(dep.id);
            if current > dep.at_revision {
                return CacheCheck::Stale(format!(
                    "dependency {} advanced from revision {} to {current}",
                    dep.id, dep.at_revision
                ));
            }
        }
        CacheCheck::Fresh
    }

    /// Reads a derived query's value, recomputing only if its cache entry
    /// is missing or stale. Also records a dependency edge from the
    /// active query context onto `id`, the same as `read_input`.
    pub fn query(&mut self, id: Id, compute: impl FnOnce(&mut Self) -> Result<Value>) -> Result<Value> {
        let value = match self.check_stale(id) {
            CacheCheck::Fresh => self.queries[&id].memo.as_ref().unwrap().value.clone(),
            CacheCheck::Stale(reason) => {
                trace!(id, reason, "salsa query stale, recomputing");
                self.force_recompute(id, compute)?
            }
            CacheCheck::Missing => self.force_recompute(id, compute)?,
        };
        let revision = self.queries[&id].memo.as_ref().unwrap().revision;
        self.record_dep(id, revision);
        Ok(value)
    }

    /// Recomputes `id` unconditionally, bypassing the cache check.
    pub fn force_recompute(&mut self, id: Id, compute: impl FnOnce(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.stack.contains(&id) {
            return Err(Error::SalsaCycle(format!("{id}")));
        }
        self.stack.push(id);
        self.recording.push(Vec::new());
        let result = compute(self);
        let deps = self.recording.pop().expect("pushed above");
        self.stack.pop();

        let value = result?;
        let revision = self.revision;
        self.queries.entry(id).or_default().memo =
            Some(MemoEntry { value: value.clone(), revision, deps: deps.clone() });
        self.events.push(RecomputeEvent { id, revision, dep_count: deps.len() });
        if let Some(subs) = self.subscribers.get_mut(&id) {
            for cb in subs {
                cb(&value);
            }
        }
        Ok(value)
    }

    pub fn subscribe(&mut self, id: Id, callback: ChangeCallback) {
        self.subscribers.entry(id).or_default().push(callback);
    }

    pub(crate) fn dep_ids(&self, id: Id) -> Vec<Id> {
        self.queries
            .get(&id)
            .and_then(|q| q.memo.as_ref())
            .map(|memo| memo.deps.iter().map(|d| d.id).collect())
            .unwrap_or_default()
    }

    pub(crate) fn all_input_ids(&self) -> Vec<Id> {
        self.inputs.keys().copied().collect()
    }

    pub(crate) fn all_query_ids(&self) -> Vec<Id> {
        self.queries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Id = 1;
    const DOUBLED: Id = 2;

    #[test]
    fn a_query_only_recomputes_when_its_dependency_changes() {
        let mut db = Database::new();
        db.set_input(A, Value::Int(5));

        let first = db.query(DOUBLED, |db| {
            let a = db.read_input(A)?;
            Ok(Value::Int(a.as_i64().unwrap() * 2))
        });
        assert_eq!(first.unwrap(), Value::Int(10));
        assert_eq!(db.events().len(), 1);

        // re-reading without any input change must hit the cache.
        let second = db.query(DOUBLED, |_| unreachable!("should be served from cache"));
        assert_eq!(second.unwrap(), Value::Int(10));
        assert_eq!(db.events().len(), 1);

        db.set_input(A, Value::Int(7));
        let third = db.query(DOUBLED, |db| {
            let a = db.read_input(A)?;
            Ok(Value::Int(a.as_i64().unwrap() * 2))
        });
        assert_eq!(third.unwrap(), Value::Int(14));
        assert_eq!(db.events().len(), 2);
    }

    #[test]
    fn writing_an_equal_value_does_not_advance_the_revision() {
        let mut db = Database::new();
        db.set_input(A, Value::Int(1));
        let r1 = db.revision();
        db.set_input(A, Value::Int(1));
        assert_eq!(db.revision(), r1);
    }

    #[test]
    fn a_self_referential_query_is_reported_as_a_cycle() {
        let mut db = Database::new();
        let err = db.force_recompute(A, |db| db.query(A, |_| Ok(Value::Null))).unwrap_err();
        assert!(matches!(err, Error::SalsaCycle(_)));
    }
}
