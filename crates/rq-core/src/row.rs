//! Row representation: a named-field record, optionally namespaced by alias.
//!
//! During join assembly the compiler nests one row per alias inside an
//! outer record (`{ [alias]: row }`); `Ref { path }` then walks that nesting
//! by field name. Representing rows as `Value::Object` under the hood means
//! the same type serves both the flat source row and the namespaced
//! intermediate shape, with no separate "joined row" type.

use crate::value::Value;
use std::collections::BTreeMap;

/// A record: a map from field name to value.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_fields(fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves a dotted `Ref { path }`: `path[0]` is looked up as a field,
    /// and each subsequent segment descends into a nested `Object`.
    /// Returns `None` (not an error) when any segment is absent, matching
    /// the IR's `Ref` evaluating to `Null` on a missing path.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Wraps this row under `alias`, producing the namespaced shape the
    /// compiler builds for `FROM`/`JOIN` (`{ alias: row }`).
    pub fn namespaced(self, alias: &str) -> Row {
        let mut out = Row::new();
        out.set(alias, Value::Object(self.0));
        out
    }

    /// Merges another namespaced row's aliases into this one (used when
    /// assembling a join's output row from both sides).
    pub fn merge(mut self, other: Row) -> Row {
        self.0.extend(other.0);
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Row(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resolves_through_one_level_of_namespacing() {
        let mut inner = Row::new();
        inner.set("name", Value::from("Alice"));
        let outer = inner.namespaced("users");
        assert_eq!(outer.get_path(&["users", "name"]), Some(&Value::from("Alice")));
        assert_eq!(outer.get_path(&["users", "missing"]), None);
        assert_eq!(outer.get_path(&["missing"]), None);
    }

    #[test]
    fn merge_combines_aliases_from_both_sides_of_a_join() {
        let mut left = Row::new();
        left.set("name", Value::from("Alice"));
        let left = left.namespaced("users");

        let mut right = Row::new();
        right.set("title", Value::from("post"));
        let right = right.namespaced("posts");

        let merged = left.merge(right);
        assert_eq!(merged.get_path(&["users", "name"]), Some(&Value::from("Alice")));
        assert_eq!(merged.get_path(&["posts", "title"]), Some(&Value::from("post")));
    }
}
