// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Data Schema
//!
//! Typed schema describing the shape of data flowing along a DAG edge.
//! Schemas are immutable — every transformation below returns a new
//! `DataSchema` rather than mutating in place — and support projection
//! tracking (the planner's [`crate::dag`] fusion/pushdown passes narrow
//! field sets before execution ever runs).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{Dataset, Value};

/// A single typed field in a [`DataSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// One of `int`, `float`, `bool`, `str`, `list`, `dict`, `any`.
    pub dtype: String,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
            nullable: true,
        }
    }
}

/// Schema describing the structure of data flowing through a DAG edge.
///
/// An empty field map means "unknown" — the planner's projection pass
/// treats unknown schemas conservatively (needed-field set becomes
/// unknown, which suppresses further pruning).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    fields: IndexMap<String, Field>,
    pub row_estimate: Option<usize>,
}

impl DataSchema {
    /// Schema with no field information.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn known(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Keep only the named fields.
    pub fn select(&self, names: &[String]) -> DataSchema {
        let wanted: std::collections::HashSet<&str> = names.iter().map(String::as_str).collect();
        DataSchema {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| wanted.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            row_estimate: self.row_estimate,
        }
    }

    /// Remove the named fields.
    pub fn drop(&self, names: &[String]) -> DataSchema {
        let remove: std::collections::HashSet<&str> = names.iter().map(String::as_str).collect();
        DataSchema {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| !remove.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            row_estimate: self.row_estimate,
        }
    }

    /// Merge another schema into this one (for joins); `prefix` is applied
    /// to every field coming from `other`.
    pub fn merge(&self, other: &DataSchema, prefix: &str) -> DataSchema {
        let mut merged = self.fields.clone();
        for f in other.fields.values() {
            let key = if prefix.is_empty() {
                f.name.clone()
            } else {
                format!("{prefix}{}", f.name)
            };
            merged.insert(
                key.clone(),
                Field {
                    name: key,
                    dtype: f.dtype.clone(),
                    nullable: f.nullable,
                },
            );
        }
        DataSchema {
            fields: merged,
            row_estimate: None,
        }
    }

    pub fn add_field(&self, name: impl Into<String>, dtype: impl Into<String>) -> DataSchema {
        let mut fields = self.fields.clone();
        let name = name.into();
        fields.insert(name.clone(), Field::new(name, dtype));
        DataSchema {
            fields,
            row_estimate: self.row_estimate,
        }
    }

    pub fn rename(&self, mapping: &IndexMap<String, String>) -> DataSchema {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for (k, f) in &self.fields {
            let new_name = mapping.get(k).cloned().unwrap_or_else(|| k.clone());
            fields.insert(
                new_name.clone(),
                Field {
                    name: new_name,
                    dtype: f.dtype.clone(),
                    nullable: f.nullable,
                },
            );
        }
        DataSchema {
            fields,
            row_estimate: self.row_estimate,
        }
    }

    pub fn with_estimate(&self, rows: usize) -> DataSchema {
        DataSchema {
            fields: self.fields.clone(),
            row_estimate: Some(rows),
        }
    }

    /// Infer a schema from data by sampling up to `sample_size` rows. A
    /// field seen with a `Null` value anywhere in the sample is marked
    /// nullable; bool is checked before int so that boolean fields aren't
    /// misclassified (Rust has no int/bool subtyping, but we keep the same
    /// sampling order as the reference implementation for parity).
    pub fn infer(data: &Dataset, sample_size: usize) -> DataSchema {
        if data.is_empty() {
            return DataSchema::default();
        }

        let mut fields: IndexMap<String, Field> = IndexMap::new();
        let mut has_null: std::collections::HashSet<String> = std::collections::HashSet::new();

        for row in data.iter().take(sample_size) {
            for (k, v) in row.iter() {
                if matches!(v, Value::Null) {
                    has_null.insert(k.to_string());
                    fields
                        .entry(k.to_string())
                        .or_insert_with(|| Field::new(k, "any"));
                    continue;
                }
                fields
                    .entry(k.to_string())
                    .or_insert_with(|| Field::new(k, v.dtype_name()));
            }
        }

        for k in has_null {
            if let Some(f) = fields.get_mut(&k) {
                f.nullable = true;
            }
        }

        DataSchema {
            fields,
            row_estimate: Some(data.len()),
        }
    }
}

impl std::fmt::Display for DataSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fields.is_empty() {
            return write!(f, "DataSchema(unknown)");
        }
        let cols: Vec<String> = self
            .fields
            .values()
            .map(|fld| format!("{}:{}", fld.name, fld.dtype))
            .collect();
        let est = self
            .row_estimate
            .map(|n| format!(", ~{n} rows"))
            .unwrap_or_default();
        write!(f, "DataSchema({}{})", cols.join(", "), est)
    }
}
