//! Aggregate functions usable in a `GroupBy` reduce step (spec §4.5).
//!
//! An `Aggregate` folds the rows in a group (each carrying its current
//! net multiplicity) into a single `Value`. Built-ins recompute from the
//! group's full row set each tick rather than maintaining a differential
//! running total — simpler, and groups are expected to be small relative
//! to the whole collection.

use rq_core::{Row, Value};
use std::sync::Arc;

/// How a raw field value is coerced before folding (spec §4.5:
/// `numeric`, `numericOrDate`, `raw`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueTransform {
    Numeric,
    NumericOrDate,
    Raw,
}

impl ValueTransform {
    fn coerce(self, value: &Value) -> Option<f64> {
        match self {
            ValueTransform::Numeric => value.as_f64(),
            ValueTransform::NumericOrDate => match value {
                Value::Date(ms) => Some(*ms as f64),
                other => other.as_f64(),
            },
            ValueTransform::Raw => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// A `defineAggregate`-registered reduction, embedded by name rather
/// than matched on `AggregateKind` (spec §6, "aggregate plugin interface").
#[derive(Clone)]
pub struct CustomAggregate {
    pub pre_map: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    pub reduce: Arc<dyn Fn(&[(Value, i64)]) -> Value + Send + Sync>,
    pub post_map: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>,
}

/// A single aggregate computation over one field of a group, producing
/// one output field.
#[derive(Clone)]
pub struct Aggregate {
    pub output_field: String,
    pub source_field: String,
    pub kind: AggregateKind,
    pub transform: ValueTransform,
    pub custom: Option<CustomAggregate>,
}

impl Aggregate {
    pub fn new(output_field: impl Into<String>, source_field: impl Into<String>, kind: AggregateKind) -> Self {
        let transform = match kind {
            AggregateKind::Count => ValueTransform::Raw,
            _ => ValueTransform::Numeric,
        };
        Self { output_field: output_field.into(), source_field: source_field.into(), kind, transform, custom: None }
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn count(output_field: impl Into<String>) -> Self {
        Self {
            output_field: output_field.into(),
            source_field: String::new(),
            kind: AggregateKind::Count,
            transform: ValueTransform::Raw,
            custom: None,
        }
    }

    /// An aggregate whose reduction is a `defineAggregate` plugin's
    /// `(preMap, reduce, postMap?)` rather than a built-in kind.
    pub fn custom(output_field: impl Into<String>, source_field: impl Into<String>, custom: CustomAggregate) -> Self {
        Self {
            output_field: output_field.into(),
            source_field: source_field.into(),
            kind: AggregateKind::Count,
            transform: ValueTransform::Raw,
            custom: Some(custom),
        }
    }

    /// Folds `rows` (each already repeated `multiplicity` times
    /// conceptually — callers pass the group's consolidated entries) into
    /// this aggregate's output value.
    pub fn compute<'a>(&self, rows: impl Iterator<Item = (&'a Row, i64)>) -> Value {
        if let Some(custom) = &self.custom {
            let mapped: Vec<(Value, i64)> = rows
                .map(|(row, mult)| {
                    let raw = row.get(&self.source_field).cloned().unwrap_or(Value::Null);
                    ((custom.pre_map)(&raw), mult)
                })
                .collect();
            let reduced = (custom.reduce)(&mapped);
            return match &custom.post_map {
                Some(post_map) => post_map(&reduced),
                None => reduced,
            };
        }
        match self.kind {
            AggregateKind::Count => {
                let total: i64 = rows.map(|(_, m)| m).sum();
                Value::Int(total)
            }
            AggregateKind::Sum => {
                let mut total = 0.0;
                let mut any = false;
                for (row, mult) in rows {
                    if let Some(v) = row.get(&self.source_field).and_then(|v| self.transform.coerce(v)) {
                        total += v * mult as f64;
                        any = true;
                    }
                }
                if any { Value::Float(total) } else { Value::Null }
            }
            AggregateKind::Avg => {
                let mut total = 0.0;
                let mut count = 0i64;
                for (row, mult) in rows {
                    if let Some(v) = row.get(&self.source_field).and_then(|v| self.transform.coerce(v)) {
                        total += v * mult as f64;
                        count += mult;
                    }
                }
                if count > 0 { Value::Float(total / count as f64) } else { Value::Null }
            }
            AggregateKind::Min => {
                let mut best: Option<f64> = None;
                for (row, mult) in rows {
                    if mult <= 0 {
                        continue;
                    }
                    if let Some(v) = row.get(&self.source_field).and_then(|v| self.transform.coerce(v)) {
                        best = Some(best.map_or(v, |b| b.min(v)));
                    }
                }
                best.map(Value::Float).unwrap_or(Value::Null)
            }
            AggregateKind::Max => {
                let mut best: Option<f64> = None;
                for (row, mult) in rows {
                    if mult <= 0 {
                        continue;
                    }
                    if let Some(v) = row.get(&self.source_field).and_then(|v| self.transform.coerce(v)) {
                        best = Some(best.map_or(v, |b| b.max(v)));
                    }
                }
                best.map(Value::Float).unwrap_or(Value::Null)
            }
        }
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
    fn sum_multiplies_by_multiplicity() {
        let agg = Aggregate::new("total", "n", AggregateKind::Sum);
        let rows = vec![row(2), row(3)];
        let out = agg.compute(rows.iter().map(|r| (r, 2)));
        assert_eq!(out, Value::Float(10.0));
    }

    #[test]
    fn count_ignores_the_source_field() {
        let agg = Aggregate::count("n_rows");
        let rows = vec![row(1), row(2), row(3)];
        let out = agg.compute(rows.iter().map(|r| (r, 1)));
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn min_skips_retracted_entries() {
        let agg = Aggregate::new("lowest", "n", AggregateKind::Min);
        let rows = vec![row(1), row(5)];
        let out = agg.compute(vec![(&rows[0], -1), (&rows[1], 1)].into_iter());
        assert_eq!(out, Value::Float(5.0));
    }
}
