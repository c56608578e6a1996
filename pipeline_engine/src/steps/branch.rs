// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `branch` Step
//!
//! Conditional routing: partition rows either by a field's literal value
//! (`on`) or by the first matching route's `when` expression, run each
//! populated route's sub-pipeline concurrently, then merge-concat (default)
//! or keep the last successful route's result.

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::{get_bool_or, get_row_map, get_str};
use super::subpipeline::{parse_step_list, run_steps};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "Conditional routing with per-route sub-pipelines",
        config_docs: vec![
            ("on", "string — field to route on by literal value"),
            ("routes", "dict — {route_name: steps[] | {when, steps[]}}, plus optional '_default'"),
            ("merge", "bool — concat all route outputs (default true) vs. keep the last route's output"),
        ],
        required_config: vec!["routes"],
    }
}

pub struct BranchStep;

fn route_steps(route_value: &Value) -> Vec<(String, IndexMap<String, Value>)> {
    match route_value {
        Value::List(_) => parse_step_list(route_value),
        Value::Row(row) => match row.get_ref("steps") {
            Some(steps) => parse_step_list(steps),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn partition_by_field(data: &Dataset, field: &str, routes: &IndexMap<String, Value>) -> IndexMap<String, Vec<Row>> {
    let mut partitions: IndexMap<String, Vec<Row>> = IndexMap::new();
    for row in data.rows() {
        let value = row.get(field).to_display_string();
        if routes.contains_key(&value) {
            partitions.entry(value).or_default().push(row.clone());
        } else if routes.contains_key("_default") {
            partitions.entry("_default".to_string()).or_default().push(row.clone());
        }
    }
    partitions
}

fn partition_by_expr(
    data: &Dataset,
    routes: &IndexMap<String, Value>,
    ctx: &Context,
) -> Result<IndexMap<String, Vec<Row>>, PipelineError> {
    let mut compiled = Vec::new();
    for (route_name, route_def) in routes {
        if route_name == "_default" {
            continue;
        }
        if let Value::Row(def) = route_def {
            if let Some(when_src) = def.get_ref("when").and_then(Value::as_str) {
                compiled.push((route_name.clone(), ctx.expr_cache.get_or_compile(when_src)?));
            }
        }
    }

    let mut partitions: IndexMap<String, Vec<Row>> = IndexMap::new();
    for row in data.rows() {
        let mut matched = false;
        for (route_name, expr) in &compiled {
            if expr.eval_bool(row) {
                partitions.entry(route_name.clone()).or_default().push(row.clone());
                matched = true;
                break;
            }
        }
        if !matched && routes.contains_key("_default") {
            partitions.entry("_default".to_string()).or_default().push(row.clone());
        }
    }
    Ok(partitions)
}

#[async_trait]
impl Step for BranchStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        if ctx.data.is_empty() {
            return Ok(Dataset::new());
        }

        let routes = get_row_map(config, "routes");
        if routes.is_empty() {
            return Ok(ctx.data.clone());
        }
        let merge = get_bool_or(config, "merge", true);
        let field = get_str(config, "on");

        let partitions = match field {
            Some(f) => partition_by_field(&ctx.data, f, &routes),
            None => partition_by_expr(&ctx.data, &routes, ctx)?,
        };

        let ctx_ref: &Context = ctx;
        let mut futures = Vec::new();
        for (route_name, rows) in &partitions {
            if rows.is_empty() {
                continue;
            }
            let route_def = routes.get(route_name).cloned().unwrap_or(Value::Null);
            let steps = route_steps(&route_def);
            let data = Dataset::from_rows(rows.clone());
            futures.push(async move {
                if steps.is_empty() {
                    Ok::<Dataset, PipelineError>(data)
                } else {
                    run_steps(&steps, data, ctx_ref).await
                }
            });
        }

        let results = join_all(futures).await;

        if merge {
            let mut merged = Vec::new();
            for result in results {
                match result {
                    Ok(dataset) => merged.extend(dataset.into_rows()),
                    Err(e) => merged.push(Row::new().with("_error", Value::String(e.to_string()))),
                }
            }
            Ok(Dataset::from_rows(merged))
        } else {
            for result in results.into_iter().rev() {
                if let Ok(dataset) = result {
                    return Ok(dataset);
                }
            }
            Ok(Dataset::new())
        }
    }

    fn supports_streaming(&self) -> bool {
        false
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
    async fn routes_by_field_value() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("status", Value::String("active".into())),
            Row::new().with("status", Value::String("inactive".into())),
        ]));
        let routes = Row::new()
            .with("active", Value::List(Vec::new()))
            .with("_default", Value::List(Vec::new()));
        let config = cfg(vec![("on", Value::String("status".into())), ("routes", Value::Row(routes))]);
        let out = BranchStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
