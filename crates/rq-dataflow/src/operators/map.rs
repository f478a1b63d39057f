//! `Map`: for each `[v, m]` emit `[f(v), m]` (spec §4.3).

use crate::{RowMultiset, UnaryOperator};
use rq_core::{RecordKey, Row};

pub struct MapOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Row + Send,
{
    f: F,
}

impl<F> MapOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Row + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> UnaryOperator for MapOperator<F>
where
    F: FnMut(&RecordKey, &Row) -> Row + Send,
{
    fn step(&mut self, input: RowMultiset) -> RowMultiset {
        input
            .into_inner()
            .into_iter()
            .map(|((key, row), mult)| {
                let mapped = (self.f)(&key, &row);
                ((key, mapped), mult)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::Value;

    #[test]
    fn map_preserves_key_and_multiplicity() {
        let mut op = MapOperator::new(|_k: &RecordKey, row: &Row| {
            let mut out = row.clone();
            out.set("doubled", Value::Int(row.get("n").and_then(|v| v.as_i64()).unwrap_or(0) * 2));
            out
        });
        let mut row = Row::new();
        row.set("n", Value::Int(3));
        let mut ms = RowMultiset::new();
        ms.push((RecordKey::Int(1), row), 2);

        let out = op.step(ms).into_inner();
        assert_eq!(out.len(), 1);
        let ((key, row), mult) = &out[0];
        assert_eq!(*key, RecordKey::Int(1));
        assert_eq!(row.get("doubled"), Some(&Value::Int(6)));
        assert_eq!(*mult, 2);
    }
}
