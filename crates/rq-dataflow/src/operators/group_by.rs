//! `GroupBy`: per-group accumulation with a `reduce` pass and optional
//! `having` filter (spec §4.5).
//!
//! Each tick, touched groups recompute their aggregate row from scratch
//! over the group's full (consolidated) row set — simpler than a fully
//! differential running accumulator, and the output is still emitted as
//! a precise retract-then-insert diff: the previous emitted row for a
//! group is tracked so a changed aggregate value, not just presence,
//! produces a correct delta.

use crate::aggregate::Aggregate;
use crate::{RowMultiset, UnaryOperator};
use hashbrown::HashMap;
use rq_core::{RecordKey, Row, Value};
use rq_multiset::Index;

pub struct GroupByOperator<KF, HF>
where
    KF: FnMut(&RecordKey, &Row) -> Value + Send,
    HF: FnMut(&Row) -> bool + Send,
{
    key_fn: KF,
    aggregates: Vec<Aggregate>,
    having: Option<HF>,
    index: Index<Value, (RecordKey, Row)>,
    last_emitted: HashMap<Value, Row>,
}

impl<KF> GroupByOperator<KF, fn(&Row) -> bool>
where
    KF: FnMut(&RecordKey, &Row) -> Value + Send,
{
    pub fn new(key_fn: KF, aggregates: Vec<Aggregate>) -> Self {
        Self { key_fn, aggregates, having: None, index: Index::new(), last_emitted: HashMap::new() }
    }
}

impl<KF, HF> GroupByOperator<KF, HF>
where
    KF: FnMut(&RecordKey, &Row) -> Value + Send,
    HF: FnMut(&Row) -> bool + Send,
{
    pub fn with_having(key_fn: KF, aggregates: Vec<Aggregate>, having: HF) -> Self {
        Self { key_fn, aggregates, having: Some(having), index: Index::new(), last_emitted: HashMap::new() }
    }

    fn consolidated_group(&self, key: &Value) -> Vec<(Row, i64)> {
        let mut counts: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for ((rk, row), m) in self.index.get_iterator(key) {
            let entry = counts.entry(rk.clone()).or_insert_with(|| (row.clone(), 0));
            entry.1 += m;
        }
        counts.into_values().filter(|(_, m)| *m != 0).collect()
    }
}

impl<KF, HF> UnaryOperator for GroupByOperator<KF, HF>
where
    KF: FnMut(&RecordKey, &Row) -> Value + Send,
    HF: FnMut(&Row) -> bool + Send,
{
    fn step(&mut self, input: RowMultiset) -> RowMultiset {
        let mut touched: Vec<Value> = Vec::new();
        for ((rk, row), mult) in input.into_inner() {
            let key = (self.key_fn)(&rk, &row);
            self.index.add_value(key.clone(), (rk, row), mult);
            touched.push(key);
        }
        touched.sort();
        touched.dedup();

        let mut out = RowMultiset::new();
        for key in touched {
            let rows = self.consolidated_group(&key);
            let exists = !rows.is_empty();

            let mut candidate = match &key {
                Value::Object(fields) => Row::from_fields(fields.clone().into_iter()),
                _ => Row::new(),
            };
            if exists {
                for agg in &self.aggregates {
                    let value = agg.compute(rows.iter().map(|(r, m)| (r, *m)));
                    candidate.set(agg.output_field.clone(), value);
                }
            }
            let passes = exists && self.having.as_mut().map(|h| h(&candidate)).unwrap_or(true);

            let previous = self.last_emitted.get(&key).cloned();
            let next = if passes { Some(candidate) } else { None };
            if previous != next {
                let out_key = RecordKey::Str(format!("group:{key}"));
                if let Some(p) = previous {
                    out.push((out_key.clone(), p), -1);
                }
                if let Some(n) = next.clone() {
                    out.push((out_key, n), 1);
                }
                match next {
                    Some(n) => {
                        self.last_emitted.insert(key, n);
                    }
                    None => {
                        self.last_emitted.remove(&key);
                    }
                }
            }
        }
        out
    }
}
