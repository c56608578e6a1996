// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `clean` Step
//!
//! Row-level normalization in a fixed operation order: coerce, defaults,
//! trim, lowercase, uppercase, replace, rename, then drop rows failing
//! `drop_nulls`/`drop_empty`. Fusable and always streaming.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::get_row_map;

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: vec![(5_000, Strategy::Streaming)],
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::Always,
        fusable: true,
        is_source: false,
        description: "Data cleaning & type coercion",
        config_docs: vec![
            ("coerce", "dict — type casting {field: int|float|bool|str}"),
            ("defaults", "dict — fill missing/null values {field: default}"),
            ("trim", "list[string] — strip whitespace from fields"),
            ("lowercase", "list[string] — lowercase string fields"),
            ("uppercase", "list[string] — uppercase string fields"),
            ("replace", "dict — string replacement {field: {old: new}}"),
            ("drop_nulls", "list[string] — drop rows where fields are null"),
            ("drop_empty", "list[string] — drop rows where fields are empty"),
            ("rename", "dict — rename fields {old: new}"),
        ],
        required_config: Vec::new(),
    }
}

pub struct CleanStep;

const TRUTHY: &[&str] = &["true", "1", "yes", "on", "t", "y"];
const FALSY: &[&str] = &["false", "0", "no", "off", "f", "n"];

fn coerce_bool(value: &Value) -> Value {
    if let Value::Bool(_) = value {
        return value.clone();
    }
    let s = value.to_display_string().trim().to_lowercase();
    if TRUTHY.contains(&s.as_str()) {
        return Value::Bool(true);
    }
    if FALSY.contains(&s.as_str()) {
        return Value::Bool(false);
    }
    Value::Bool(value.is_truthy())
}

fn coerce_one(value: &Value, target_type: &str) -> Option<Value> {
    match target_type {
        "int" => value.as_i64().map(Value::Int),
        "float" => value.as_f64().map(Value::Float),
        "bool" => Some(coerce_bool(value)),
        "str" => Some(Value::String(value.to_display_string())),
        _ => None,
    }
}

fn clean_row(
    row: &Row,
    coerce: &IndexMap<String, Value>,
    defaults: &IndexMap<String, Value>,
    trim: &[String],
    lowercase: &[String],
    uppercase: &[String],
    replace: &IndexMap<String, Value>,
    rename: &IndexMap<String, Value>,
) -> Row {
    let mut row = row.clone();

    for (field, target_type) in coerce {
        if let Some(ty) = target_type.as_str() {
            if row.contains(field) && !row.get(field).is_null() {
                if let Some(coerced) = coerce_one(&row.get(field), ty) {
                    row.set(field.clone(), coerced);
                }
            }
        }
    }

    for (field, default) in defaults {
        if row.get(field).is_null() {
            row.set(field.clone(), default.clone());
        }
    }

    for field in trim {
        if let Value::String(s) = row.get(field) {
            row.set(field.clone(), Value::String(s.trim().to_string()));
        }
    }
    for field in lowercase {
        if let Value::String(s) = row.get(field) {
            row.set(field.clone(), Value::String(s.to_lowercase()));
        }
    }
    for field in uppercase {
        if let Value::String(s) = row.get(field) {
            row.set(field.clone(), Value::String(s.to_uppercase()));
        }
    }

    for (field, replacements) in replace {
        if let Value::String(s) = row.get(field) {
            if let Value::Row(pairs) = replacements {
                let mut out = s;
                for (old, new) in pairs.iter() {
                    out = out.replace(old, &new.to_display_string());
                }
                row.set(field.clone(), Value::String(out));
            }
        }
    }

    if !rename.is_empty() {
        let mut renamed = Row::new();
        for (k, v) in row.iter() {
            let new_name = rename.get(k).and_then(Value::as_str).unwrap_or(k);
            renamed.set(new_name.to_string(), v.clone());
        }
        row = renamed;
    }

    row
}

fn should_drop(row: &Row, drop_nulls: &[String], drop_empty: &[String]) -> bool {
    for field in drop_nulls {
        if row.get(field).is_null() {
            return true;
        }
    }
    for field in drop_empty {
        if row.get(field) == Value::String(String::new()) {
            return true;
        }
    }
    false
}

#[async_trait]
impl Step for CleanStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        use super::support::get_str_list;

        let coerce = get_row_map(config, "coerce");
        let defaults = get_row_map(config, "defaults");
        let trim = get_str_list(config, "trim");
        let lowercase = get_str_list(config, "lowercase");
        let uppercase = get_str_list(config, "uppercase");
        let replace = get_row_map(config, "replace");
        let drop_nulls = get_str_list(config, "drop_nulls");
        let drop_empty = get_str_list(config, "drop_empty");
        let rename = get_row_map(config, "rename");

        let mut out = Vec::with_capacity(ctx.data.len());
        for row in ctx.data.iter() {
            let cleaned = clean_row(row, &coerce, &defaults, &trim, &lowercase, &uppercase, &replace, &rename);
            if !should_drop(&cleaned, &drop_nulls, &drop_empty) {
                out.push(cleaned);
            }
        }
        Ok(Dataset::from_rows(out))
    }

    async fn execute_stream<'a>(
        &'a self,
        config: &'a IndexMap<String, Value>,
        ctx: &'a mut Context,
    ) -> Result<BoxStream<'a, Row>, PipelineError> {
        let dataset = self.execute(config, ctx).await?;
        Ok(Box::pin(stream::iter(dataset.into_rows())))
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::registry::StepRegistry;
    use std::collections::HashMap;

    fn cfg(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn trims_and_drops_nulls() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("name", Value::String(" bob ".into())).with("id", Value::Null),
            Row::new().with("name", Value::String(" amy ".into())).with("id", Value::Int(1)),
        ]));
        let config = cfg(vec![
            ("trim", Value::List(vec![Value::String("name".into())])),
            ("drop_nulls", Value::List(vec![Value::String("id".into())])),
        ]);
        let out = CleanStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].get("name"), Value::String("amy".into()));
    }

    #[tokio::test]
    async fn coerces_and_fills_defaults() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new()
            .with("age", Value::String("42".into()))
            .with("status", Value::Null)]));
        let config = cfg(vec![
            ("coerce", Value::Row(Row::new().with("age", Value::String("int".into())))),
            ("defaults", Value::Row(Row::new().with("status", Value::String("pending".into())))),
        ]);
        let out = CleanStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.rows()[0].get("age"), Value::Int(42));
        assert_eq!(out.rows()[0].get("status"), Value::String("pending".into()));
    }
}
