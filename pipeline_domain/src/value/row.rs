// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Value;

/// An order-preserving string-keyed map of [`Value`]s.
///
/// Field order is preserved on insertion (`IndexMap`, not `HashMap`) because
/// several steps (`select`, `transform.flatten`, JSON/CSV `load`/`file`)
/// depend on reproducing the declared field order. A field that was never
/// inserted reads as [`Value::Null`] via [`Row::get`], never a lookup error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Field value, or `Null` if the field is absent.
    pub fn get(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn get_ref(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.0.get_index_of(from) {
            let (_, v) = self.0.swap_remove_index(idx).unwrap();
            // Preserve position by re-inserting at the same index via a
            // rebuild; IndexMap has no "insert at index" primitive.
            let mut rebuilt: IndexMap<String, Value> = IndexMap::with_capacity(self.0.len() + 1);
            for (i, (k, val)) in self.0.iter().enumerate() {
                if i == idx {
                    rebuilt.insert(to.to_string(), v.clone());
                }
                rebuilt.insert(k.clone(), val.clone());
            }
            if idx >= self.0.len() {
                rebuilt.insert(to.to_string(), v);
            }
            self.0 = rebuilt;
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy retaining only the named fields, in the order they appear in
    /// `names` (used by `transform.select`).
    pub fn select(&self, names: &[String]) -> Row {
        let mut out = Row::new();
        for n in names {
            out.set(n.clone(), self.get(n));
        }
        out
    }

    /// A copy without the named fields, original order preserved.
    pub fn drop_fields(&self, names: &[String]) -> Row {
        let mut out = self.clone();
        for n in names {
            out.remove(n);
        }
        out
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Row(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a str, &'a Value);
    type IntoIter = std::iter::Map<
        indexmap::map::Iter<'a, String, Value>,
        fn((&'a String, &'a Value)) -> (&'a str, &'a Value),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_reads_as_null() {
        let row = Row::new();
        assert_eq!(row.get("missing"), Value::Null);
    }

    #[test]
    fn select_preserves_requested_order() {
        let row = Row::new().with("a", 1.into()).with("b", 2.into()).with("c", 3.into());
        let selected = row.select(&["c".into(), "a".into()]);
        let names: Vec<&str> = selected.field_names().collect();
        assert_eq!(names, vec!["c", "a"]);
    }
}
