// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Step URIs
//!
//! Shared `sqlite:///`, `csv:///`, `json:///` source/sink resolution used by
//! `join`, `load`, and `file`. `stdout` is a `load`-only sink and is handled
//! there directly.

use pipeline_domain::{Dataset, PipelineError, Row, Value};

/// Strip a `scheme:///` or `scheme://` prefix, returning the bare filesystem
/// path.
pub fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> &'a str {
    uri.strip_prefix(&format!("{scheme}:///"))
        .or_else(|| uri.strip_prefix(&format!("{scheme}://")))
        .unwrap_or(uri)
}

pub fn scheme_of(uri: &str) -> &str {
    uri.split(':').next().unwrap_or("")
}

pub async fn load(uri: &str, table: Option<&str>) -> Result<Dataset, PipelineError> {
    match scheme_of(uri) {
        "sqlite" => load_sqlite(strip_scheme(uri, "sqlite"), table.unwrap_or("data")).await,
        "csv" => load_csv(strip_scheme(uri, "csv")),
        "json" => load_json(strip_scheme(uri, "json")),
        other => Err(PipelineError::Definition(format!(
            "unknown source scheme '{other}'. Use sqlite:///, csv:///, or json:///"
        ))),
    }
}

pub fn load_csv(path: &str) -> Result<Dataset, PipelineError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PipelineError::step_runtime("join", format!("reading csv '{path}': {e}")))?;
    let headers = reader
        .headers()
        .map_err(|e| PipelineError::step_runtime("join", format!("reading csv headers: {e}")))?
        .clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PipelineError::step_runtime("join", format!("reading csv row: {e}")))?;
        let mut row = Row::new();
        for (name, field) in headers.iter().zip(record.iter()) {
            row.set(name.to_string(), Value::String(field.to_string()));
        }
        rows.push(row);
    }
    Ok(Dataset::from_rows(rows))
}

pub fn load_json(path: &str) -> Result<Dataset, PipelineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::step_runtime("join", format!("reading json '{path}': {e}")))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| PipelineError::step_runtime("join", format!("parsing json '{path}': {e}")))?;
    let rows = match value {
        serde_json::Value::Array(items) => items.into_iter().map(json_to_row).collect(),
        other => vec![json_to_row(other)],
    };
    Ok(Dataset::from_rows(rows))
}

pub(crate) fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(_) => Value::Row(json_to_row(v)),
    }
}

pub(crate) fn json_to_row(v: serde_json::Value) -> Row {
    match v {
        serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect(),
        other => Row::new().with("value", json_to_value(other)),
    }
}

/// Inverse of [`json_to_value`], used by `load` and `cache` to serialize a
/// dataset back to JSON.
pub(crate) fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Row(r) => row_to_json(r),
    }
}

pub(crate) fn row_to_json(row: &Row) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (k, v) in row.iter() {
        map.insert(k.to_string(), value_to_json(v));
    }
    serde_json::Value::Object(map)
}

pub async fn load_sqlite(path: &str, table: &str) -> Result<Dataset, PipelineError> {
    use sqlx::{Column, Row as SqlxRow, SqlitePool, TypeInfo, ValueRef};

    if !std::path::Path::new(path).exists() {
        return Err(PipelineError::step_runtime("join", format!("sqlite database not found: {path}")));
    }
    let pool = SqlitePool::connect(&format!("sqlite://{path}"))
        .await
        .map_err(|e| PipelineError::step_runtime("join", format!("opening sqlite '{path}': {e}")))?;
    let query = format!("SELECT * FROM \"{table}\"");
    let sql_rows = sqlx::query(&query)
        .fetch_all(&pool)
        .await
        .map_err(|e| PipelineError::step_runtime("join", format!("querying '{table}': {e}")))?;
    pool.close().await;

    let mut rows = Vec::with_capacity(sql_rows.len());
    for sql_row in &sql_rows {
        let mut row = Row::new();
        for col in sql_row.columns() {
            let name = col.name().to_string();
            let raw = sql_row.try_get_raw(col.ordinal())
                .map_err(|e| PipelineError::step_runtime("join", format!("reading column '{name}': {e}")))?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                match col.type_info().name() {
                    "INTEGER" | "BIGINT" | "BOOLEAN" => {
                        sql_row.try_get::<i64, _>(col.ordinal()).map(Value::Int).unwrap_or(Value::Null)
                    }
                    "REAL" | "FLOAT" | "DOUBLE" => {
                        sql_row.try_get::<f64, _>(col.ordinal()).map(Value::Float).unwrap_or(Value::Null)
                    }
                    _ => sql_row.try_get::<String, _>(col.ordinal()).map(Value::String).unwrap_or(Value::Null),
                }
            };
            row.set(name, value);
        }
        rows.push(row);
    }
    Ok(Dataset::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_triple_slash_scheme() {
        assert_eq!(strip_scheme("sqlite:///tmp/db.sqlite", "sqlite"), "tmp/db.sqlite");
        assert_eq!(strip_scheme("csv:///data.csv", "csv"), "data.csv");
    }

    #[test]
    fn scheme_of_splits_on_colon() {
        assert_eq!(scheme_of("json:///x.json"), "json");
        assert_eq!(scheme_of("stdout"), "stdout");
    }
}
