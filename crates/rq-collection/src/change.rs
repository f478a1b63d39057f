//! The unit of notification a collection hands to its subscribers (spec
//! §4.8), adapted from the teacher's `crates/reactive/src/change_set.rs`
//! batch-of-deltas shape onto a keyed insert/update/delete log instead of
//! a materialized-row diff — a collection's subscribers need the write
//! that happened, not just the row before/after.

use rq_core::{RecordKey, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: RecordKey,
    pub value: Option<Row>,
    /// The row this key held immediately before the write took effect.
    /// `None` for an insert into a previously-absent key, or when the
    /// change hasn't passed through a commit yet — a writer states its
    /// intent without knowing the prior value; the collection core fills
    /// this in from its own store right before applying the write, which
    /// is what a dataflow sink needs to retract the old row.
    pub previous: Option<Row>,
}

impl Change {
    pub fn insert(key: RecordKey, value: Row) -> Self {
        Self { kind: ChangeKind::Insert, key, value: Some(value), previous: None }
    }

    pub fn update(key: RecordKey, value: Row) -> Self {
        Self { kind: ChangeKind::Update, key, value: Some(value), previous: None }
    }

    pub fn delete(key: RecordKey) -> Self {
        Self { kind: ChangeKind::Delete, key, value: None, previous: None }
    }

    pub fn with_previous(mut self, previous: Option<Row>) -> Self {
        self.previous = previous;
        self
    }
}

/// Collapses a batch of writes staged within one `begin`/`commit` to one
/// entry per key, keeping the last write. A delete immediately followed
/// by an insert on the same key must surface as a single `Insert` (the
/// key didn't exist when the batch started), which falls out of
/// "keep the last write" without any special-casing.
///
/// Scans in reverse so the first time a key is seen is its last
/// occurrence in the original order, then reverses the result back to
/// the original relative order of the surviving writes.
pub fn collapse_batch(staged: Vec<Change>) -> Vec<Change> {
    let mut seen = hashbrown::HashSet::new();
    let mut out: Vec<Change> = staged
        .into_iter()
        .rev()
        .filter(|c| seen.insert(c.key.clone()))
        .collect();
    out.reverse();
    out
}
