//! `Distinct`: per-key (or per-value) running multiplicity state; output
//! multiplicity is `sign(Σm) > 0 ? 1 : 0`, emitting retractions as the
//! state flips (spec §4.3).

use crate::{RowMultiset, UnaryOperator};
use hashbrown::HashMap;
use rq_core::{RecordKey, Row, Value};

/// Grouping key for distinctness: defaults to the row's own content
/// (per-value distinct) unless a `key_fn` narrows it to a projection
/// (per-key distinct, e.g. `DISTINCT` over a `select`).
type GroupKey = Value;

struct GroupState {
    net_multiplicity: i64,
    is_present: bool,
    sample: (RecordKey, Row),
}

pub struct DistinctOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Value + Send,
{
    key_fn: F,
    groups: HashMap<GroupKey, GroupState>,
}

impl DistinctOperator<fn(&RecordKey, &Row) -> Value> {
    /// Per-value distinct: groups by the row's own content.
    pub fn per_value() -> Self {
        DistinctOperator::new(|_k, row| row.clone().into_value())
    }
}

impl<F> DistinctOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Value + Send,
{
    pub fn new(key_fn: F) -> Self {
        Self { key_fn, groups: HashMap::new() }
    }
}

impl<F> UnaryOperator for DistinctOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Value + Send,
{
    fn step(&mut self, input: RowMultiset) -> RowMultiset {
        let mut touched: Vec<GroupKey> = Vec::new();
        for ((key, row), mult) in input.into_inner() {
            let group_key = (self.key_fn)(&key, &row);
            let entry = self.groups.entry(group_key.clone()).or_insert_with(|| GroupState {
                net_multiplicity: 0,
                is_present: false,
                sample: (key.clone(), row.clone()),
            });
            entry.net_multiplicity += mult;
            entry.sample = (key, row);
            touched.push(group_key);
        }

        let mut out = RowMultiset::new();
        touched.sort_unstable_by(|a, b| a.cmp(b));
        touched.dedup();
        for group_key in touched {
            let entry = self.groups.get_mut(&group_key).expect("just touched");
            let should_be_present = entry.net_multiplicity > 0;
            if should_be_present != entry.is_present {
                let diff = if should_be_present { 1 } else { -1 };
                out.push(entry.sample.clone(), diff);
                entry.is_present = should_be_present;
            }
            if entry.net_multiplicity == 0 {
                self.groups.remove(&group_key);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: i64) -> Row {
        let mut r = Row::new();
        r.set("n", Value::Int(n));
        r
    }

    #[test]
    fn duplicate_inserts_emit_a_single_addition() {
        let mut op = DistinctOperator::per_value();
        let mut ms = RowMultiset::new();
        ms.push((RecordKey::Int(1), row(5)), 1);
        ms.push((RecordKey::Int(2), row(5)), 1);
        let out = op.step(ms).into_inner();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, 1);
    }

    #[test]
    fn removing_the_last_copy_emits_a_retraction() {
        let mut op = DistinctOperator::per_value();
        op.step({
            let mut ms = RowMultiset::new();
            ms.push((RecordKey::Int(1), row(5)), 1);
            ms
        });
        let mut ms = RowMultiset::new();
        ms.push((RecordKey::Int(1), row(5)), -1);
        let out = op.step(ms).into_inner();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, -1);
    }
}
