// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `parallel` Step
//!
//! Runs a list of single-step branches concurrently against the node's
//! current dataset, then merges: `concat` (default, flattens all outputs),
//! `zip` (pairs rows positionally, stopping at the shortest branch,
//! `branch_N_` prefixing a field name that collides with an earlier
//! branch's), or `dict` (each branch's whole output nested under
//! `branch_N`).

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::get_string_or;
use super::subpipeline::{parse_step_list, run_steps};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Async,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "Run multiple step branches concurrently and merge results",
        config_docs: vec![
            ("branches", "list — one single-key step map per branch"),
            ("merge", "string — concat | zip | dict (default concat)"),
        ],
        required_config: vec!["branches"],
    }
}

pub struct ParallelStep;

fn merge_concat(results: Vec<Dataset>) -> Dataset {
    let mut merged = Vec::new();
    for result in results {
        merged.extend(result.into_rows());
    }
    Dataset::from_rows(merged)
}

fn merge_zip(results: Vec<Dataset>) -> Dataset {
    if results.is_empty() {
        return Dataset::new();
    }
    let min_len = results.iter().map(Dataset::len).min().unwrap_or(0);
    let mut merged = Vec::with_capacity(min_len);
    for i in 0..min_len {
        let mut combined = Row::new();
        for (branch_idx, result) in results.iter().enumerate() {
            for (k, v) in result.rows()[i].iter() {
                let key = if combined.contains(k) { format!("branch_{branch_idx}_{k}") } else { k.to_string() };
                combined.set(key, v.clone());
            }
        }
        merged.push(combined);
    }
    Dataset::from_rows(merged)
}

fn merge_dict(results: Vec<Dataset>) -> Dataset {
    let mut merged = Vec::with_capacity(results.len());
    for (i, result) in results.into_iter().enumerate() {
        let rows: Vec<Value> = result.into_rows().into_iter().map(Value::Row).collect();
        merged.push(Row::new().with(format!("branch_{i}"), Value::List(rows)));
    }
    Dataset::from_rows(merged)
}

#[async_trait]
impl Step for ParallelStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let branches = config.get("branches").map(parse_step_list).unwrap_or_default();
        let merge_mode = get_string_or(config, "merge", "concat");

        if branches.is_empty() {
            return Ok(ctx.data.clone());
        }

        let ctx_ref: &Context = ctx;
        let data = ctx.data.clone();
        let futures = branches.into_iter().map(|(step_type, step_config)| {
            let data = data.clone();
            async move {
                match run_steps(&[(step_type.clone(), step_config)], data, ctx_ref).await {
                    Ok(dataset) => dataset,
                    Err(e) => Dataset::from_rows(vec![Row::new()
                        .with("_error", Value::String(e.to_string()))
                        .with("_step", Value::String(step_type))]),
                }
            }
        });

        let results: Vec<Dataset> = join_all(futures).await;

        let merged = match merge_mode.as_str() {
            "zip" => merge_zip(results),
            "dict" => merge_dict(results),
            _ => merge_concat(results),
        };
        Ok(merged)
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
    async fn concat_merges_branch_outputs() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("x", Value::Int(1))]));
        let branches = Value::List(vec![
            Value::Row(Row::new().with("transform", Value::Row(Row::new().with("limit", Value::Int(1))))),
            Value::Row(Row::new().with("transform", Value::Row(Row::new().with("limit", Value::Int(1))))),
        ]);
        let config = cfg(vec![("branches", branches), ("merge", Value::String("concat".into()))]);
        ctx.registry.register("transform", || Box::new(crate::steps::transform::TransformStep), crate::steps::transform::meta());
        let out = ParallelStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
