// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `guard` Step
//!
//! The andon cord: a quality gate that validates schema, required fields,
//! row-count bounds, and null-freedom, then raises `PipelineError::QualityGate`
//! listing every violation found (truncated past 10 per check) rather than
//! stopping at the first one. With `andon: true` it also compares the current
//! row count against the pipeline's historical average, best-effort.

use async_trait::async_trait;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::get_bool_or;

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "Quality gate: schema, required fields, row counts, nulls, andon anomaly check",
        config_docs: vec![
            ("schema", "map — field: int|float|str|bool|list|dict, checked against a 100-row sample"),
            ("required", "list — fields that must be present on every row"),
            ("expect_rows", "string — exact count \"N\" or range \"MIN..MAX\""),
            ("expect_no_nulls", "list — fields that must never be null"),
            ("andon", "bool — compare row count against historical average (default false)"),
        ],
        required_config: Vec::new(),
    }
}

pub struct GuardStep;

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "int" => matches!(value, Value::Int(_)) || value.as_i64().is_some(),
        "float" => matches!(value, Value::Int(_) | Value::Float(_)) || value.as_f64().is_some(),
        "str" => matches!(value, Value::String(_)),
        "bool" => matches!(value, Value::Bool(_)),
        "list" => matches!(value, Value::List(_)),
        "dict" => matches!(value, Value::Row(_)),
        _ => true,
    }
}

fn validate_schema(data: &Dataset, schema: &Row) -> Vec<String> {
    let mut errors = Vec::new();
    let sample_size = data.len().min(100);
    for (i, row) in data.rows().iter().take(sample_size).enumerate() {
        for (field, expected) in schema.iter() {
            let Value::String(expected_type) = expected else { continue };
            if !row.contains(field) {
                continue;
            }
            let value = row.get_ref(field);
            if matches!(value, Some(Value::Null)) || value.is_none() {
                continue;
            }
            let value = value.unwrap();
            if !type_matches(expected_type, value) {
                errors.push(format!(
                    "Row {i}: '{field}' expected {expected_type}, got {} ({})",
                    value.dtype_name(),
                    value.to_display_string()
                ));
                if errors.len() >= 10 {
                    errors.push("(truncated, more errors exist)".to_string());
                    return errors;
                }
            }
        }
    }
    errors
}

fn validate_required(data: &Dataset, required: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    for (i, row) in data.rows().iter().enumerate() {
        for field in required {
            if !row.contains(field) {
                errors.push(format!("Row {i}: missing required field '{field}'"));
                if errors.len() >= 10 {
                    errors.push("(truncated)".to_string());
                    return errors;
                }
            }
        }
    }
    errors
}

fn validate_row_count(data: &Dataset, spec: &str) -> Vec<String> {
    let count = data.len();
    if let Some((lo, hi)) = spec.split_once("..") {
        let min_rows: usize = lo.trim().parse().unwrap_or(0);
        let max_rows: usize = hi.trim().parse().unwrap_or(usize::MAX);
        if count < min_rows {
            return vec![format!("Expected at least {min_rows} rows, got {count}")];
        }
        if count > max_rows {
            return vec![format!("Expected at most {max_rows} rows, got {count}")];
        }
    } else if let Ok(expected) = spec.trim().parse::<usize>() {
        if count != expected {
            return vec![format!("Expected exactly {expected} rows, got {count}")];
        }
    }
    Vec::new()
}

fn validate_no_nulls(data: &Dataset, fields: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    for field in fields {
        let null_count = data.rows().iter().filter(|r| matches!(r.get(field), Value::Null)).count();
        if null_count > 0 {
            errors.push(format!(
                "Field '{field}' has {null_count} null values ({null_count}/{} rows)",
                data.len()
            ));
        }
    }
    errors
}

async fn andon_check(data: &Dataset, ctx: &Context) -> Vec<String> {
    let Some(metrics) = &ctx.metrics else { return Vec::new() };
    let pipeline_name = ctx.pipeline_name();
    if pipeline_name.is_empty() {
        return Vec::new();
    }
    let average = match metrics.mean_row_count(pipeline_name).await {
        Ok(Some(avg)) if avg > 0.0 => avg,
        _ => return Vec::new(),
    };
    let current = data.len() as f64;
    let deviation = (current - average).abs() / average;
    if deviation > 0.5 {
        let direction = if current > average { "more" } else { "fewer" };
        vec![format!(
            "Andon: {} rows is {:.0}% {direction} than average ({:.0}). Possible anomaly.",
            data.len(),
            deviation * 100.0,
            average
        )]
    } else {
        Vec::new()
    }
}

fn string_list(config: &IndexMap<String, Value>, key: &str) -> Vec<String> {
    match config.get(key) {
        Some(Value::List(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[async_trait]
impl Step for GuardStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let data = ctx.data.clone();
        let mut errors = Vec::new();

        if let Some(Value::Row(schema)) = config.get("schema") {
            errors.extend(validate_schema(&data, schema));
        }
        if config.contains_key("required") {
            errors.extend(validate_required(&data, &string_list(config, "required")));
        }
        if let Some(spec) = config.get("expect_rows") {
            errors.extend(validate_row_count(&data, &spec.to_display_string()));
        }
        if config.contains_key("expect_no_nulls") {
            errors.extend(validate_no_nulls(&data, &string_list(config, "expect_no_nulls")));
        }
        if get_bool_or(config, "andon", false) {
            errors.extend(andon_check(&data, ctx).await);
        }

        if !errors.is_empty() {
            let msg = format!("Quality gate FAILED:\n{}", errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"));
            return Err(PipelineError::QualityGate(msg));
        }

        Ok(data)
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
    async fn missing_required_field_fails() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("id", Value::Int(1))]));
        let config = cfg(vec![("required", Value::List(vec![Value::String("name".into())]))]);
        let err = GuardStep.execute(&config, &mut ctx).await.unwrap_err();
        assert!(err.is_quality_gate());
    }

    #[tokio::test]
    async fn row_count_in_range_passes() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("id", Value::Int(1)), Row::new().with("id", Value::Int(2))]));
        let config = cfg(vec![("expect_rows", Value::String("1..5".into()))]);
        let out = GuardStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn null_field_fails() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("email", Value::Null)]));
        let config = cfg(vec![("expect_no_nulls", Value::List(vec![Value::String("email".into())]))]);
        let err = GuardStep.execute(&config, &mut ctx).await.unwrap_err();
        assert!(err.is_quality_gate());
    }
}
