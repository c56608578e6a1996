// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `aggregate` Step
//!
//! Single-pass GROUP BY with `sum/avg/min/max/count/count_distinct(field)`
//! functions, an optional `having` filter, and an optional `sort`. Escalates
//! to the multiprocess strategy above 50k input rows — grouping is CPU-bound
//! and benefits from the pooled executor.

use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::{get_row_map, get_str, get_str_list};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: vec![(50_000, Strategy::Multiprocess)],
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "SQL-style GROUP BY + aggregation",
        config_docs: vec![
            ("group_by", "list[string] — fields to group on (optional for a global aggregate)"),
            ("functions", "dict — {alias: 'func(field)'}, e.g. {total: 'sum(revenue)'}"),
            ("having", "string — post-aggregation filter expression"),
            ("sort", "string — \"field\" or \"field desc\""),
        ],
        required_config: vec!["functions"],
    }
}

static AGG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(sum|avg|min|max|count|count_distinct)\((\w+)\)$").unwrap()
});

pub struct AggregateStep;

fn compute_agg(func: &str, field: &str, rows: &[&Row]) -> Value {
    match func {
        "count" => Value::Int(rows.iter().filter(|r| !r.get(field).is_null()).count() as i64),
        "count_distinct" => {
            let set: HashSet<String> = rows
                .iter()
                .filter_map(|r| {
                    let v = r.get(field);
                    if v.is_null() { None } else { Some(v.to_display_string()) }
                })
                .collect();
            Value::Int(set.len() as i64)
        }
        _ => {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.get(field).as_f64()).collect();
            if values.is_empty() {
                return Value::Null;
            }
            match func {
                "sum" => Value::Float(values.iter().sum()),
                "avg" => Value::Float(values.iter().sum::<f64>() / values.len() as f64),
                "min" => Value::Float(values.iter().cloned().fold(f64::INFINITY, f64::min)),
                "max" => Value::Float(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                _ => Value::Null,
            }
        }
    }
}

#[async_trait]
impl Step for AggregateStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        if ctx.data.is_empty() {
            return Ok(Dataset::new());
        }

        let group_by = get_str_list(config, "group_by");
        let functions = get_row_map(config, "functions");
        if functions.is_empty() {
            return Ok(ctx.data.clone());
        }

        let mut parsed: Vec<(String, String, String)> = Vec::with_capacity(functions.len());
        for (alias, func_str) in &functions {
            let func_str = func_str.as_str().unwrap_or_default().trim();
            let caps = AGG_RE.captures(func_str).ok_or_else(|| {
                PipelineError::step_runtime(
                    "aggregate",
                    format!("invalid aggregation '{func_str}'. Expected: sum|avg|min|max|count|count_distinct(field)"),
                )
            })?;
            parsed.push((alias.clone(), caps[1].to_string(), caps[2].to_string()));
        }

        let mut groups: IndexMap<Vec<String>, Vec<&Row>> = IndexMap::new();
        for row in ctx.data.rows() {
            let key: Vec<String> = group_by.iter().map(|f| row.get(f).to_display_string()).collect();
            groups.entry(key).or_default().push(row);
        }

        let mut result = Vec::with_capacity(groups.len());
        for (key, rows) in &groups {
            let mut out = Row::new();
            for (field, value) in group_by.iter().zip(key) {
                out.set(field.clone(), Value::String(value.clone()));
            }
            for (alias, func, field) in &parsed {
                out.set(alias.clone(), compute_agg(func, field, rows));
            }
            result.push(out);
        }

        if let Some(having_src) = get_str(config, "having") {
            let having = ctx.expr_cache.get_or_compile(having_src)?;
            result.retain(|row| having.eval_bool(row));
        }

        if let Some(sort_spec) = get_str(config, "sort") {
            let mut parts = sort_spec.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let descending = parts.next().map(|d| d.eq_ignore_ascii_case("desc")).unwrap_or(false);
            result.sort_by(|a, b| {
                let ord = a.get(&field).partial_cmp(&b.get(&field)).unwrap_or(std::cmp::Ordering::Equal);
                if descending { ord.reverse() } else { ord }
            });
        }

        Ok(Dataset::from_rows(result))
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
    async fn groups_and_sums() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("cat", Value::String("a".into())).with("revenue", Value::Int(10)),
            Row::new().with("cat", Value::String("a".into())).with("revenue", Value::Int(5)),
            Row::new().with("cat", Value::String("b".into())).with("revenue", Value::Int(1)),
        ]));
        let config = cfg(vec![
            ("group_by", Value::List(vec![Value::String("cat".into())])),
            ("functions", Value::Row(Row::new().with("total", Value::String("sum(revenue)".into())))),
            ("sort", Value::String("total desc".into())),
        ]);
        let out = AggregateStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].get("cat"), Value::String("a".into()));
        assert_eq!(out.rows()[0].get("total"), Value::Float(15.0));
    }

    #[tokio::test]
    async fn having_filters_groups() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("cat", Value::String("a".into())).with("revenue", Value::Int(10)),
            Row::new().with("cat", Value::String("b".into())).with("revenue", Value::Int(1)),
        ]));
        let config = cfg(vec![
            ("group_by", Value::List(vec![Value::String("cat".into())])),
            ("functions", Value::Row(Row::new().with("total", Value::String("sum(revenue)".into())))),
            ("having", Value::String("total > 5".into())),
        ]);
        let out = AggregateStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
    }
}
