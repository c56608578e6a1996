// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Small helpers for reading typed values out of a step's `IndexMap<String,
//! Value>` config. Every step's config arrives already deserialized from
//! YAML/JSON into [`Value`]; these just narrow it down to what a given
//! config key is expected to hold, defaulting rather than erroring wherever
//! the reference steps default rather than error.

use indexmap::IndexMap;
use pipeline_domain::Value;

pub fn get_str<'a>(config: &'a IndexMap<String, Value>, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

pub fn get_string_or(config: &IndexMap<String, Value>, key: &str, default: &str) -> String {
    get_str(config, key).unwrap_or(default).to_string()
}

pub fn get_usize_or(config: &IndexMap<String, Value>, key: &str, default: usize) -> usize {
    config.get(key).and_then(Value::as_i64).map(|v| v.max(0) as usize).unwrap_or(default)
}

pub fn get_bool_or(config: &IndexMap<String, Value>, key: &str, default: bool) -> bool {
    match config.get(key) {
        Some(v) => v.is_truthy(),
        None => default,
    }
}

/// A `list[string]` config value; a bare string is treated as a one-element
/// list (several reference steps accept either shape).
pub fn get_str_list(config: &IndexMap<String, Value>, key: &str) -> Vec<String> {
    match config.get(key) {
        Some(Value::List(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// A `dict` config value as a field-name-keyed map, preserving declaration
/// order.
pub fn get_row_map(config: &IndexMap<String, Value>, key: &str) -> IndexMap<String, Value> {
    match config.get(key) {
        Some(Value::Row(row)) => row.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        _ => IndexMap::new(),
    }
}
