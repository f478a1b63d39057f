//! `Join`: the bilinear incremental join (spec §4.4).
//!
//! For two indices `A` and `B` kept up to date tick over tick, a new
//! pair of deltas `(dA, dB)` produces:
//!
//! ```text
//! dOut = dA ⋈ B_old  +  A_old ⋈ dB  +  dA ⋈ dB
//! ```
//!
//! which equals `(A+dA) ⋈ (B+dB) - A⋈B` without recomputing the full
//! join. `Left`/`Right`/`Full`/`Anti` additionally track, per unmatched
//! row (not per group), how much null-padded mass is currently owed and
//! emit a retraction/insertion delta when that changes — a group can
//! hold several unmatched rows at once, and each must be padded and
//! un-padded independently of its neighbors.

use crate::{BinaryOperator, RowMultiset};
use hashbrown::HashMap;
use rq_core::{RecordKey, Row, Value};
use rq_multiset::Index;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// Left-anti: left rows with no matching right row, emitted alone.
    Anti,
}

type GroupIndex = Index<Value, (RecordKey, Row)>;

pub struct JoinOperator<KL, KR, M>
where
    KL: FnMut(&RecordKey, &Row) -> Value + Send,
    KR: FnMut(&RecordKey, &Row) -> Value + Send,
    M: FnMut(&Row, &Row) -> Row + Send,
{
    kind: JoinKind,
    left_key: KL,
    right_key: KR,
    merge: M,
    index_a: GroupIndex,
    index_b: GroupIndex,
    /// Per join key, the left rows currently carrying an owed null-pad
    /// and the mass of that pad last emitted for each.
    padded_left: HashMap<Value, HashMap<RecordKey, (Row, i64)>>,
    padded_right: HashMap<Value, HashMap<RecordKey, (Row, i64)>>,
}

impl<KL, KR, M> JoinOperator<KL, KR, M>
where
    KL: FnMut(&RecordKey, &Row) -> Value + Send,
    KR: FnMut(&RecordKey, &Row) -> Value + Send,
    M: FnMut(&Row, &Row) -> Row + Send,
{
    pub fn new(kind: JoinKind, left_key: KL, right_key: KR, merge: M) -> Self {
        Self {
            kind,
            left_key,
            right_key,
            merge,
            index_a: Index::new(),
            index_b: Index::new(),
            padded_left: HashMap::new(),
            padded_right: HashMap::new(),
        }
    }

    /// Reconciles the owed null-pad mass for one side of one join key
    /// against its current group contents, emitting the delta needed to
    /// bring each row's pad output to `row_mass` (if `pad_active`) or `0`.
    fn reconcile_pads(
        owed: &mut HashMap<Value, HashMap<RecordKey, (Row, i64)>>,
        group: Vec<(RecordKey, Row, i64)>,
        key: &Value,
        pad_active: bool,
        mut emit: impl FnMut(&RecordKey, &Row, i64),
    ) {
        let mut current: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for (rk, row, m) in group {
            current.insert(rk, (row, m));
        }

        let mut tracked = owed.remove(key).unwrap_or_default();
        let rks: Vec<RecordKey> = current.keys().chain(tracked.keys()).cloned().collect::<std::collections::HashSet<_>>().into_iter().collect();

        let mut next: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for rk in rks {
            let current_mass = current.get(&rk).map(|(_, m)| *m).unwrap_or(0);
            let desired = if pad_active { current_mass } else { 0 };
            let prev_mass = tracked.get(&rk).map(|(_, m)| *m).unwrap_or(0);
            let diff = desired - prev_mass;
            let row = current
                .get(&rk)
                .map(|(r, _)| r.clone())
                .or_else(|| tracked.remove(&rk).map(|(r, _)| r))
                .unwrap_or_else(Row::new);
            if diff != 0 {
                emit(&rk, &row, diff);
            }
            if desired != 0 {
                next.insert(rk, (row, desired));
            }
        }
        if !next.is_empty() {
            owed.insert(key.clone(), next);
        }
    }

    fn consolidated_group(index: &GroupIndex, key: &Value) -> Vec<(RecordKey, Row, i64)> {
        let mut counts: HashMap<RecordKey, (Row, i64)> = HashMap::new();
        for ((rk, row), m) in index.get_iterator(key) {
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

impl<KL, KR, M> BinaryOperator for JoinOperator<KL, KR, M>
where
    KL: FnMut(&RecordKey, &Row) -> Value + Send,
    KR: FnMut(&RecordKey, &Row) -> Value + Send,
    M: FnMut(&Row, &Row) -> Row + Send,
{
    fn step(&mut self, left: RowMultiset, right: RowMultiset) -> RowMultiset {
        let mut delta_a: GroupIndex = Index::new();
        for ((rk, row), mult) in left.into_inner() {
            let k = (self.left_key)(&rk, &row);
            delta_a.add_value(k, (rk, row), mult);
        }
        let mut delta_b: GroupIndex = Index::new();
        for ((rk, row), mult) in right.into_inner() {
            let k = (self.right_key)(&rk, &row);
            delta_b.add_value(k, (rk, row), mult);
        }

        let mut out = RowMultiset::new();

        if self.kind != JoinKind::Anti {
            let matched = delta_a.join(&self.index_b) + self.index_a.join(&delta_b) + delta_a.join(&delta_b);
            for ((_, ((l_rk, l_row), (r_rk, r_row))), m) in matched.into_inner() {
                let merged = (self.merge)(&l_row, &r_row);
                let out_key = RecordKey::Str(format!("{l_rk}|{r_rk}"));
                out.push((out_key, merged), m);
            }
        }

        let mut touched: Vec<Value> = delta_a.keys().cloned().chain(delta_b.keys().cloned()).collect();
        touched.sort();
        touched.dedup();

        self.index_a.append(delta_a);
        self.index_b.append(delta_b);

        for key in touched {
            let mass_a = self.index_a.mass(&key);
            let mass_b = self.index_b.mass(&key);

            if matches!(self.kind, JoinKind::Left | JoinKind::Full | JoinKind::Anti) {
                let pad_active = mass_a > 0 && mass_b <= 0;
                let group = Self::consolidated_group(&self.index_a, &key);
                let merge = &mut self.merge;
                Self::reconcile_pads(&mut self.padded_left, group, &key, pad_active, |rk, row, diff| {
                    let merged = (merge)(row, &Row::new());
                    let out_key = RecordKey::Str(format!("{rk}|\u{2205}"));
                    out.push((out_key, merged), diff);
                });
            }
            if matches!(self.kind, JoinKind::Right | JoinKind::Full) {
                let pad_active = mass_b > 0 && mass_a <= 0;
                let group = Self::consolidated_group(&self.index_b, &key);
                let merge = &mut self.merge;
                Self::reconcile_pads(&mut self.padded_right, group, &key, pad_active, |rk, row, diff| {
                    let merged = (merge)(&Row::new(), row);
                    let out_key = RecordKey::Str(format!("\u{2205}|{rk}"));
                    out.push((out_key, merged), diff);
                });
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_row(id: i64, name: &str) -> Row {
        let mut r = Row::new();
        r.set("id", Value::Int(id));
        r.set("name", Value::String(name.to_string()));
        r
    }

    fn order_row(user_id: i64, item: &str) -> Row {
        let mut r = Row::new();
        r.set("user_id", Value::Int(user_id));
        r.set("item", Value::String(item.to_string()));
        r
    }

    fn merge(left: &Row, right: &Row) -> Row {
        let mut out = left.clone();
        for (field, v) in right.fields() {
            out.set(format!("order_{field}"), v.clone());
        }
        out
    }

    #[test]
    fn inner_join_emits_only_matched_pairs() {
        let mut op = JoinOperator::new(
            JoinKind::Inner,
            |_: &RecordKey, row: &Row| row.get("id").cloned().unwrap_or(Value::Null),
            |_: &RecordKey, row: &Row| row.get("user_id").cloned().unwrap_or(Value::Null),
            merge,
        );

        let mut users = RowMultiset::new();
        users.push((RecordKey::Int(1), user_row(1, "ada")), 1);
        let mut orders = RowMultiset::new();
        orders.push((RecordKey::Int(10), order_row(1, "widget")), 1);
        orders.push((RecordKey::Int(11), order_row(2, "gadget")), 1);

        let out = op.step(users, orders).into_inner();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0 .1.get("order_item"), Some(&Value::String("widget".into())));
    }

    #[test]
    fn left_join_pads_every_unmatched_row_in_a_shared_group_independently() {
        let mut op = JoinOperator::new(
            JoinKind::Left,
            |_: &RecordKey, row: &Row| row.get("id").cloned().unwrap_or(Value::Null),
            |_: &RecordKey, row: &Row| row.get("user_id").cloned().unwrap_or(Value::Null),
            merge,
        );

        // Two distinct left rows share the same join key (id=5) while no
        // right row matches it yet.
        let mut first = RowMultiset::new();
        first.push((RecordKey::Int(1), user_row(5, "ada")), 1);
        let out1 = op.step(first, RowMultiset::new()).into_inner();
        assert_eq!(out1.len(), 1);
        assert_eq!(out1[0].1, 1);

        // A second, still-unmatched row joins the same group — it must get
        // its own null-pad too, not be silently skipped because the group
        // was already padded.
        let mut second = RowMultiset::new();
        second.push((RecordKey::Int(2), user_row(5, "bob")), 1);
        let out2 = op.step(second, RowMultiset::new()).into_inner();
        assert_eq!(out2.len(), 1);
        assert_eq!(out2[0].1, 1);

        // A matching right row arrives: both padded rows must retract
        // exactly once each, alongside the two new matched rows — no
        // output key should end up with negative net multiplicity.
        let mut orders = RowMultiset::new();
        orders.push((RecordKey::Int(10), order_row(5, "widget")), 1);
        let out3 = op.step(RowMultiset::new(), orders).consolidate().into_inner();
        for (_, m) in out3.iter() {
            assert!(*m >= 0, "no output key may have negative net multiplicity");
        }
        let net: i64 = out3.iter().map(|(_, m)| m).sum();
        // two new matched rows; the two null-pads from the two unmatched
        // rows retract fully (net 0 contribution from padding).
        assert_eq!(net, 2);
    }

    #[test]
    fn left_join_pads_unmatched_then_retracts_on_match() {
        let mut op = JoinOperator::new(
            JoinKind::Left,
            |_: &RecordKey, row: &Row| row.get("id").cloned().unwrap_or(Value::Null),
            |_: &RecordKey, row: &Row| row.get("user_id").cloned().unwrap_or(Value::Null),
            merge,
        );

        let mut users = RowMultiset::new();
        users.push((RecordKey::Int(1), user_row(1, "ada")), 1);
        let out1 = op.step(users, RowMultiset::new()).into_inner();
        assert_eq!(out1.len(), 1);
        assert_eq!(out1[0].1, 1);

        let mut orders = RowMultiset::new();
        orders.push((RecordKey::Int(10), order_row(1, "widget")), 1);
        let out2 = op.step(RowMultiset::new(), orders).into_inner();
        // one retraction of the padded row, one insertion of the matched row
        assert_eq!(out2.len(), 2);
        let net: i64 = out2.iter().map(|(_, m)| m).sum();
        assert_eq!(net, 1);
    }
}
