//! `Filter`: emit `[v, m]` iff `p(v)` is true (spec §4.3).
//!
//! `Null` counts as false for the filter's own decision but is not
//! otherwise special-cased — predicates evaluate it like any other
//! non-truthy value (spec §4.3's "three-valued" note).

use crate::{RowMultiset, UnaryOperator};
use rq_core::{RecordKey, Row};

pub struct FilterOperator<P>
where
    P: FnMut(&RecordKey, &Row) -> bool + Send,
{
    predicate: P,
}

impl<P> FilterOperator<P>
where
    P: FnMut(&RecordKey, &Row) -> bool + Send,
{
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

impl<P> UnaryOperator for FilterOperator<P>
where
    P: FnMut(&RecordKey, &Row) -> bool + Send,
{
    fn step(&mut self, input: RowMultiset) -> RowMultiset {
        input
            .into_inner()
            .into_iter()
            .filter(|((key, row), _)| (self.predicate)(key, row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::Value;

    #[test]
    fn filter_drops_non_matching_entries() {
        let mut op = FilterOperator::new(|_: &RecordKey, row: &Row| {
            row.get("age").and_then(|v| v.as_i64()).map(|a| a > 18).unwrap_or(false)
        });
        let mut young = Row::new();
        young.set("age", Value::Int(10));
        let mut old = Row::new();
        old.set("age", Value::Int(40));

        let mut ms = RowMultiset::new();
        ms.push((RecordKey::Int(1), young), 1);
        ms.push((RecordKey::Int(2), old), 1);

        let out = op.step(ms).into_inner();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0 .0, RecordKey::Int(2));
    }
}
