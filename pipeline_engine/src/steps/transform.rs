// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `transform` Step
//!
//! Row-level ops then collection ops, in the fixed order flatten, select,
//! rename, filter, compute, sort, dedupe, limit. The row-level ops stream;
//! sort/dedupe/limit force full materialization (see
//! [`StepMeta::streaming_breakers`](pipeline_domain::step::StepMeta)).

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use crate::jsonpath;

use super::support::{get_row_map, get_str, get_str_list};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: vec!["sort", "dedupe", "limit"],
        streaming: StreamingCapability::Conditional,
        fusable: true,
        is_source: false,
        description: "Row-level and collection-level data transformation",
        config_docs: vec![
            ("flatten", "string — JSONPath expanding each row into 0..N rows"),
            ("select", "list[string] — keep only these fields"),
            ("rename", "dict — rename fields {old: new}"),
            ("filter", "string — expression; rows where it is falsy are dropped"),
            ("compute", "dict — new fields {name: expression}"),
            ("sort", "string — \"field\" or \"field desc\""),
            ("dedupe", "list[string] — drop rows with a previously-seen key tuple"),
            ("limit", "int — keep only the first N rows"),
        ],
        required_config: Vec::new(),
    }
}

pub struct TransformStep;

fn flatten_row(row: &Row, path: &str) -> Vec<Row> {
    let extracted = jsonpath::extract(&Value::Row(row.clone()), path);
    match extracted {
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Row(r) => r,
                other => Row::new().with("value", other),
            })
            .collect(),
        Value::Row(r) => vec![r],
        Value::Null => Vec::new(),
        other => vec![Row::new().with("value", other)],
    }
}

fn select_row(row: &Row, fields: &[String]) -> Row {
    row.select(fields)
}

fn rename_row(row: &Row, mapping: &IndexMap<String, Value>) -> Row {
    if mapping.is_empty() {
        return row.clone();
    }
    let mut out = Row::new();
    for (k, v) in row.iter() {
        let new_name = mapping.get(k).and_then(Value::as_str).unwrap_or(k);
        out.set(new_name.to_string(), v.clone());
    }
    out
}

fn apply_row_ops(
    row: Row,
    flatten: Option<&str>,
    select: &[String],
    rename: &IndexMap<String, Value>,
    filter_expr: Option<&pipeline_domain::CompiledExpr>,
    compute: &[(String, std::sync::Arc<pipeline_domain::CompiledExpr>)],
    out: &mut Vec<Row>,
) {
    let candidates = match flatten {
        Some(path) => flatten_row(&row, path),
        None => vec![row],
    };
    for mut r in candidates {
        if !select.is_empty() {
            r = select_row(&r, select);
        }
        if !rename.is_empty() {
            r = rename_row(&r, rename);
        }
        if let Some(expr) = filter_expr {
            if !expr.eval_bool(&r) {
                continue;
            }
        }
        for (name, expr) in compute {
            let v = expr.eval(&r);
            r.set(name.clone(), v);
        }
        out.push(r);
    }
}

#[async_trait]
impl Step for TransformStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let flatten = get_str(config, "flatten");
        let select = get_str_list(config, "select");
        let rename = get_row_map(config, "rename");
        let filter_expr = match get_str(config, "filter") {
            Some(src) => Some(ctx.expr_cache.get_or_compile(src)?),
            None => None,
        };
        let compute = match config.get("compute") {
            Some(Value::Row(fields)) => {
                let mut compiled = Vec::with_capacity(fields.len());
                for (name, expr_src) in fields.iter() {
                    if let Some(src) = expr_src.as_str() {
                        compiled.push((name.to_string(), ctx.expr_cache.get_or_compile(src)?));
                    }
                }
                compiled
            }
            _ => Vec::new(),
        };

        let mut out = Vec::with_capacity(ctx.data.len());
        for row in ctx.data.rows() {
            apply_row_ops(row.clone(), flatten, &select, &rename, filter_expr.as_deref(), &compute, &mut out);
        }

        if let Some(sort_spec) = get_str(config, "sort") {
            let mut parts = sort_spec.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let descending = parts.next().map(|d| d.eq_ignore_ascii_case("desc")).unwrap_or(false);
            out.sort_by(|a, b| {
                let ord = a.get(&field).partial_cmp(&b.get(&field)).unwrap_or(std::cmp::Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let dedupe_keys = get_str_list(config, "dedupe");
        if !dedupe_keys.is_empty() {
            let mut seen: HashSet<Vec<String>> = HashSet::new();
            out.retain(|row| {
                let key: Vec<String> = dedupe_keys.iter().map(|k| row.get(k).to_display_string()).collect();
                seen.insert(key)
            });
        }

        if let Some(limit) = config.get("limit").and_then(Value::as_i64) {
            out.truncate(limit.max(0) as usize);
        }

        Ok(Dataset::from_rows(out))
    }

    async fn execute_stream<'a>(
        &'a self,
        config: &'a IndexMap<String, Value>,
        ctx: &'a mut Context,
    ) -> Result<BoxStream<'a, Row>, PipelineError> {
        if config.contains_key("sort") || config.contains_key("dedupe") || config.contains_key("limit") {
            let dataset = self.execute(config, ctx).await?;
            return Ok(Box::pin(stream::iter(dataset.into_rows())));
        }

        let flatten = get_str(config, "flatten");
        let select = get_str_list(config, "select");
        let rename = get_row_map(config, "rename");
        let filter_expr = match get_str(config, "filter") {
            Some(src) => Some(ctx.expr_cache.get_or_compile(src)?),
            None => None,
        };
        let compute = match config.get("compute") {
            Some(Value::Row(fields)) => {
                let mut compiled = Vec::with_capacity(fields.len());
                for (name, expr_src) in fields.iter() {
                    if let Some(src) = expr_src.as_str() {
                        compiled.push((name.to_string(), ctx.expr_cache.get_or_compile(src)?));
                    }
                }
                compiled
            }
            _ => Vec::new(),
        };

        let mut out = Vec::new();
        for row in ctx.data.rows() {
            apply_row_ops(row.clone(), flatten, &select, &rename, filter_expr.as_deref(), &compute, &mut out);
        }
        Ok(Box::pin(stream::iter(out)))
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
    async fn filter_then_compute() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("price", Value::Int(5)).with("qty", Value::Int(1)),
            Row::new().with("price", Value::Int(20)).with("qty", Value::Int(3)),
        ]));
        let config = cfg(vec![
            ("filter", Value::String("price > 10".into())),
            ("compute", Value::Row(Row::new().with("total", Value::String("price * qty".into())))),
        ]);
        let out = TransformStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].get("total"), Value::Int(60));
    }

    #[tokio::test]
    async fn sort_dedupe_limit() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("k", Value::Int(2)),
            Row::new().with("k", Value::Int(1)),
            Row::new().with("k", Value::Int(1)),
        ]));
        let config = cfg(vec![
            ("sort", Value::String("k".into())),
            ("dedupe", Value::List(vec![Value::String("k".into())])),
            ("limit", Value::Int(1)),
        ]);
        let out = TransformStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].get("k"), Value::Int(1));
    }
}
