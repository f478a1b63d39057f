//! `Index<K, V>`: a keyed multi-map from `K` to a multiset of `V` (spec §4.1).
//!
//! This generalizes the teacher's `JoinState` (two `HashMap<Vec<Value>,
//! Vec<Row>>` indices, one per join side) into a single reusable structure
//! used by both join sides and by `groupBy`'s per-key accumulation.

use crate::multiset::Multiset;
use hashbrown::HashMap;
use std::hash::Hash;

#[derive(Clone, Debug, Default)]
pub struct Index<K, V> {
    map: HashMap<K, Vec<(V, i64)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Index<K, V> {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn add_value(&mut self, key: K, value: V, multiplicity: i64) {
        self.map.entry(key).or_default().push((value, multiplicity));
    }

    /// Merges another index's entries into this one in place.
    pub fn append(&mut self, other: Index<K, V>) {
        for (k, mut entries) in other.map {
            self.map.entry(k).or_default().append(&mut entries);
        }
    }

    pub fn get_iterator(&self, key: &K) -> impl Iterator<Item = &(V, i64)> {
        self.map.get(key).into_iter().flatten()
    }

    pub fn entries_iterators(&self) -> impl Iterator<Item = (&K, &[(V, i64)])> {
        self.map.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Net multiplicity mass at `key`: `Σ` of the entries' multiplicities.
    pub fn mass(&self, key: &K) -> i64 {
        self.map.get(key).map(|v| v.iter().map(|(_, m)| m).sum()).unwrap_or(0)
    }

    pub fn has_presence(&self, key: &K) -> bool {
        self.mass(key) != 0
    }
}

impl<K, V1> Index<K, V1>
where
    K: Eq + Hash + Clone,
    V1: Clone,
{
    /// The multiset join: `self ⋈ other`, multiplicities multiply and are
    /// summed over all `(v1, v2)` pairs sharing a key (spec §4.1).
    pub fn join<V2: Clone>(&self, other: &Index<K, V2>) -> Multiset<(K, (V1, V2))> {
        let mut result = Multiset::new();
        for (k, left_entries) in self.map.iter() {
            if let Some(right_entries) = other.map.get(k) {
                for (lv, lm) in left_entries {
                    for (rv, rm) in right_entries {
                        result.push((k.clone(), (lv.clone(), rv.clone())), lm * rm);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_multiplies_and_sums_matching_entries() {
        let mut a: Index<i32, &str> = Index::new();
        a.add_value(1, "a1", 2);
        a.add_value(1, "a2", 1);
        let mut b: Index<i32, &str> = Index::new();
        b.add_value(1, "b1", 3);

        let joined = a.join(&b).consolidate();
        let entries = joined.into_inner();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&((1, ("a1", "b1")), 6)));
        assert!(entries.contains(&((1, ("a2", "b1")), 3)));
    }

    #[test]
    fn mass_and_presence_track_net_multiplicity() {
        let mut idx: Index<i32, &str> = Index::new();
        idx.add_value(1, "x", 2);
        idx.add_value(1, "x", -2);
        assert_eq!(idx.mass(&1), 0);
        assert!(!idx.has_presence(&1));
        idx.add_value(1, "y", 1);
        assert!(idx.has_presence(&1));
    }
}
