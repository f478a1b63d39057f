//! `TopK`: a bounded, ordered window over a partition (spec §4.3, §4.6).
//!
//! Every touched partition's window is recomputed from the partition's
//! full live row set each tick — correct but not differential; a
//! genuinely incremental top-k would track only the boundary rows. The
//! window is still emitted as a precise diff against what was last
//! materialized, and ties break on the row's own key so ordering is
//! stable across ticks. Backfilling a shrunk window from storage (the
//! `loadSubset` hook) is the caller's responsibility — this operator
//! only knows about rows it has already seen.

use crate::{RowMultiset, UnaryOperator};
use hashbrown::HashMap;
use rq_core::{RecordKey, Row, Value};
use rq_multiset::Index;
use std::cmp::Ordering;

pub struct TopKOperator<PF, CF>
where
    PF: FnMut(&RecordKey, &Row) -> Value + Send,
    CF: FnMut(&Row, &Row) -> Ordering + Send,
{
    partition_fn: PF,
    compare: CF,
    limit: usize,
    offset: usize,
    index: Index<Value, (RecordKey, Row)>,
    last_window: HashMap<Value, Vec<(RecordKey, Row)>>,
}

impl<PF, CF> TopKOperator<PF, CF>
where
    PF: FnMut(&RecordKey, &Row) -> Value + Send,
    CF: FnMut(&Row, &Row) -> Ordering + Send,
{
    pub fn new(partition_fn: PF, compare: CF, limit: usize, offset: usize) -> Self {
        Self { partition_fn, compare, limit, offset, index: Index::new(), last_window: HashMap::new() }
    }

    fn consolidated_partition(&self, key: &Value) -> Vec<(RecordKey, Row, i64)> {
        let mut counts: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for ((rk, row), m) in self.index.get_iterator(key) {
            let entry = counts.entry(rk.clone()).or_insert_with(|| (row.clone(), 0));
            entry.1 += m;
        }
        counts
            .into_iter()
            .filter(|(_, (_, m))| *m != 0)
            .map(|(rk, (row, m))| (rk, row, m))
            .collect()
    }
}

impl<PF, CF> UnaryOperator for TopKOperator<PF, CF>
where
    PF: FnMut(&RecordKey, &Row) -> Value + Send,
    CF: FnMut(&Row, &Row) -> Ordering + Send,
{
    fn step(&mut self, input: RowMultiset) -> RowMultiset {
        let mut touched: Vec<Value> = Vec::new();
        for ((rk, row), mult) in input.into_inner() {
            let partition = (self.partition_fn)(&rk, &row);
            self.index.add_value(partition.clone(), (rk, row), mult);
            touched.push(partition);
        }
        touched.sort();
        touched.dedup();

        let mut out = RowMultiset::new();
        for partition in touched {
            let mut live = self.consolidated_partition(&partition);
            live.sort_by(|(lk, lr, _), (rk, rr, _)| (self.compare)(lr, rr).then_with(|| lk.cmp(rk)));

            let window: Vec<(RecordKey, Row)> = live
                .into_iter()
                .skip(self.offset)
                .take(self.limit)
                .map(|(rk, row, _)| (rk, row))
                .collect();

            let previous = self.last_window.get(&partition).cloned().unwrap_or_default();
            let prev_keys: std::collections::HashSet<&RecordKey> = previous.iter().map(|(k, _)| k).collect();
            let next_keys: std::collections::HashSet<&RecordKey> = window.iter().map(|(k, _)| k).collect();

            for (rk, row) in &previous {
                if !next_keys.contains(rk) {
                    out.push((rk.clone(), row.clone()), -1);
                }
            }
            for (rk, row) in &window {
                if !prev_keys.contains(rk) {
                    out.push((rk.clone(), row.clone()), 1);
                }
            }

            self.last_window.insert(partition, window);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(score: i64) -> Row {
        let mut r = Row::new();
        r.set("score", Value::Int(score));
        r
    }

    fn by_score_desc(a: &Row, b: &Row) -> Ordering {
        let sa = a.get("score").and_then(|v| v.as_i64()).unwrap_or(0);
        let sb = b.get("score").and_then(|v| v.as_i64()).unwrap_or(0);
        sb.cmp(&sa)
    }

    #[test]
    fn window_keeps_only_the_top_entries() {
        let mut op = TopKOperator::new(|_: &RecordKey, _: &Row| Value::Null, by_score_desc, 2, 0);
        let mut ms = RowMultiset::new();
        ms.push((RecordKey::Int(1), row(10)), 1);
        ms.push((RecordKey::Int(2), row(30)), 1);
        ms.push((RecordKey::Int(3), row(20)), 1);

        let out = op.step(ms).into_inner();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(_, m)| *m == 1));
    }

    #[test]
    fn a_higher_scoring_row_evicts_the_window_tail() {
        let mut op = TopKOperator::new(|_: &RecordKey, _: &Row| Value::Null, by_score_desc, 1, 0);
        let mut first = RowMultiset::new();
        first.push((RecordKey::Int(1), row(10)), 1);
        op.step(first);

        let mut second = RowMultiset::new();
        second.push((RecordKey::Int(2), row(50)), 1);
        let out = op.step(second).into_inner();
        assert_eq!(out.len(), 2);
        let net: i64 = out.iter().map(|(_, m)| m).sum();
        assert_eq!(net, 0);
    }
}
