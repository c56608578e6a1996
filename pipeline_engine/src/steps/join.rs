// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `join` Step
//!
//! Hash-join of the node's main dataset against a right-side dataset,
//! inner/left/outer. A multi-input DAG node: the right side comes from
//! whichever non-`default` port landed in [`Context::inputs`], falling back
//! to loading the `right` URI directly for the legacy linear-steps form.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::{get_str, get_str_list};
use crate::uri;

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "Dataset merge/join on a shared key",
        config_docs: vec![
            ("right", "string — right-side source (sqlite:///, csv:///, json:///); ignored when a predecessor feeds a non-default input port"),
            ("right_table", "string — table name for a sqlite right side"),
            ("on", "string — join key (same name both sides)"),
            ("left_on", "string — left key, when names differ"),
            ("right_on", "string — right key, when names differ"),
            ("how", "string — inner | left | outer (default inner)"),
            ("select_right", "list[string] — keep only these right-side fields"),
            ("prefix_right", "string — prefix applied to right-side field names"),
        ],
        required_config: vec!["on", "left_on"],
    }
}

pub struct JoinStep;

fn merge_row(left: &Row, right: Option<&Row>, right_key: &str, prefix: &str) -> Row {
    let mut out = left.clone();
    let Some(right) = right else { return out };
    for (k, v) in right.iter() {
        if k == right_key {
            continue;
        }
        let out_key = if prefix.is_empty() { k.to_string() } else { format!("{prefix}{k}") };
        out.set(out_key, v.clone());
    }
    out
}

#[async_trait]
impl Step for JoinStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        if ctx.data.is_empty() {
            return Ok(Dataset::new());
        }

        let how = get_str(config, "how").unwrap_or("inner");
        let left_key = get_str(config, "left_on").or_else(|| get_str(config, "on"));
        let right_key = get_str(config, "right_on").or_else(|| get_str(config, "on"));
        let (left_key, right_key) = match (left_key, right_key) {
            (Some(l), Some(r)) => (l.to_string(), r.to_string()),
            _ => {
                return Err(PipelineError::Definition(
                    "join requires 'on' or 'left_on'/'right_on'".to_string(),
                ))
            }
        };

        let mut right_data = load_right(config, ctx).await?;

        let select_right = get_str_list(config, "select_right");
        if !select_right.is_empty() {
            let mut keep: Vec<String> = select_right.clone();
            if !keep.iter().any(|k| k == &right_key) {
                keep.push(right_key.clone());
            }
            right_data = right_data.iter().map(|r| r.select(&keep)).collect();
        }

        let mut right_index: HashMap<String, Vec<&Row>> = HashMap::new();
        for row in right_data.rows() {
            let k = row.get(&right_key);
            if !k.is_null() {
                right_index.entry(k.to_display_string()).or_default().push(row);
            }
        }

        let prefix = get_str(config, "prefix_right").unwrap_or("");

        let mut result = Vec::new();
        let mut matched_keys: HashSet<String> = HashSet::new();

        for row in ctx.data.rows() {
            let k = row.get(&left_key);
            let lookup = if k.is_null() { None } else { right_index.get(&k.to_display_string()) };
            match lookup {
                Some(matches) => {
                    matched_keys.insert(k.to_display_string());
                    for right_row in matches {
                        result.push(merge_row(row, Some(right_row), &right_key, prefix));
                    }
                }
                None => {
                    if how == "inner" {
                        continue;
                    }
                    result.push(merge_row(row, None, &right_key, prefix));
                }
            }
        }

        if how == "outer" {
            let left_fields: Vec<String> = ctx.data.rows().first().map(|r| r.field_names().map(str::to_string).collect()).unwrap_or_default();
            for right_row in right_data.rows() {
                let k = right_row.get(&right_key);
                if k.is_null() || matched_keys.contains(&k.to_display_string()) {
                    continue;
                }
                let mut out = Row::new();
                for lf in &left_fields {
                    out.set(lf.clone(), Value::Null);
                }
                for (rk, rv) in right_row.iter() {
                    if rk == right_key {
                        out.set(left_key.clone(), rv.clone());
                    } else {
                        let out_key = if prefix.is_empty() { rk.to_string() } else { format!("{prefix}{rk}") };
                        out.set(out_key, rv.clone());
                    }
                }
                result.push(out);
            }
        } else if how != "inner" && how != "left" {
            return Err(PipelineError::Definition(format!(
                "unknown join type '{how}'. Use inner, left, or outer"
            )));
        }

        Ok(Dataset::from_rows(result))
    }
}

async fn load_right(config: &IndexMap<String, Value>, ctx: &Context) -> Result<Dataset, PipelineError> {
    for (port, data) in &ctx.inputs {
        if port != "default" {
            return Ok(data.clone());
        }
    }
    let source = get_str(config, "right").ok_or_else(|| {
        PipelineError::Definition("join requires 'right' (or a non-default DAG input port)".to_string())
    })?;
    let table = get_str(config, "right_table");
    uri::load(source, table).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::registry::StepRegistry;
    use std::collections::HashMap as StdHashMap;

    fn cfg(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn inner_join_via_dag_input_port() {
        let mut ctx = Context::new("t", StdHashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![
            Row::new().with("id", Value::Int(1)),
            Row::new().with("id", Value::Int(2)),
        ]));
        ctx.inputs.insert(
            "right".to_string(),
            Dataset::from_rows(vec![Row::new().with("id", Value::Int(1)).with("name", Value::String("a".into()))]),
        );
        let config = cfg(vec![("on", Value::String("id".into())), ("how", Value::String("inner".into()))]);
        let out = JoinStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].get("name"), Value::String("a".into()));
    }

    #[tokio::test]
    async fn left_join_keeps_unmatched_left_rows() {
        let mut ctx = Context::new("t", StdHashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("id", Value::Int(9))]));
        ctx.inputs.insert("right".to_string(), Dataset::new());
        let config = cfg(vec![("on", Value::String("id".into())), ("how", Value::String("left".into()))]);
        let out = JoinStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
    }
}
