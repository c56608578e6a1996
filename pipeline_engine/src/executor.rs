// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DAG Executor
//!
//! Runs a [`pipeline_domain::ExecutionDAG`] level by level: a single-node
//! level runs directly, a multi-node level dispatches every node as a
//! concurrent task and awaits the whole group before advancing. Node
//! outputs are kept in a node-id-keyed map, never by position, since
//! within-level completion order is unconstrained.

use std::collections::HashMap;
use std::time::Instant;

use indexmap::IndexMap;
use pipeline_domain::dag::ExecutionDAG;
use pipeline_domain::schema::DataSchema;
use pipeline_domain::step::Strategy;
use pipeline_domain::{Context, Dataset, OnError, PipelineError, Row, StepRegistry, Value};

/// Stored outcome of one executed DAG node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub node_id: String,
    pub data: Dataset,
    pub schema: Option<DataSchema>,
    pub duration_ms: f64,
    pub errors: Vec<String>,
}

/// Rows sampled when inferring a node's output schema; large enough to catch
/// most nullable fields without re-scanning the whole dataset.
const SCHEMA_SAMPLE_SIZE: usize = 100;

pub struct DagExecutor;

impl DagExecutor {
    /// Run every node of `dag` against `ctx`, in topological/parallel-level
    /// order. `ctx.data` on entry is the driver-supplied initial dataset fed
    /// to every root node; on return, `ctx.data` holds the concatenation (in
    /// leaf-discovery order) of every leaf's output.
    pub async fn run(dag: &ExecutionDAG, ctx: &mut Context, on_error: OnError) -> Result<(), PipelineError> {
        Self::run_with_jit(dag, ctx, on_error, None).await
    }

    /// Same as [`Self::run`], additionally hashing each node's output
    /// against `jit`'s recorded hash for this pipeline+step position and
    /// incrementing `ctx.jit_steps_skipped` on a match.
    pub async fn run_with_jit(
        dag: &ExecutionDAG,
        ctx: &mut Context,
        on_error: OnError,
        jit: Option<&crate::change_detector::HashStore>,
    ) -> Result<(), PipelineError> {
        let groups = dag.parallel_groups()?;
        let mut results: HashMap<String, NodeResult> = HashMap::new();
        let initial_data = ctx.data.clone();
        let mut step_index = 0usize;
        let pipeline_name = ctx.pipeline_name().to_string();

        for group in groups {
            if group.len() == 1 {
                let node_id = &group[0];
                let outcome = Self::run_node(dag, node_id, &results, &initial_data, ctx, step_index, on_error).await?;
                if let Some(outcome) = &outcome {
                    Self::apply_jit(jit, &pipeline_name, step_index, &outcome.data, ctx)?;
                }
                step_index += 1;
                if let Some(outcome) = outcome {
                    results.insert(node_id.clone(), outcome);
                }
            } else {
                let mut handles = Vec::with_capacity(group.len());
                for node_id in &group {
                    let node_id = node_id.clone();
                    let dag = dag.clone();
                    let results_snapshot = results.clone();
                    let initial_data = initial_data.clone();
                    let mut node_ctx = ctx.child();
                    handles.push(tokio::spawn(async move {
                        let outcome = run_node_isolated(&dag, &node_id, &results_snapshot, &initial_data, &mut node_ctx, on_error).await;
                        (node_id, node_ctx, outcome)
                    }));
                }

                // Await in submission order so vars merge deterministically
                // within this build (true concurrent completion order isn't
                // observable without per-task timestamps, which the spec
                // deliberately leaves unconstrained for same-level nodes).
                for handle in handles {
                    let (node_id, node_ctx, outcome) = handle.await.map_err(|e| PipelineError::Internal(format!("node task '{e}' panicked")))?;
                    ctx.merge_vars_from(&node_ctx);
                    match outcome? {
                        Some(result) => {
                            ctx.log_step(step_index, dag.nodes[&node_id].step_type.clone(), result.data.len(), result.duration_ms, result.errors.clone());
                            Self::apply_jit(jit, &pipeline_name, step_index, &result.data, ctx)?;
                            results.insert(node_id, result);
                        }
                        None => {
                            ctx.log_step(step_index, dag.nodes[&node_id].step_type.clone(), 0, 0.0, Vec::new());
                        }
                    }
                    step_index += 1;
                }
            }
        }

        let leaves = dag.leaves();
        let mut final_data = Dataset::new();
        for leaf in &leaves {
            if let Some(result) = results.get(leaf) {
                final_data.extend(result.data.clone());
            }
        }
        ctx.set_data(final_data);
        Ok(())
    }

    /// Hash `data` against the recorded hash for `pipeline_name`+`step_index`
    /// and bump `ctx.jit_steps_skipped` on a match. No-op when `jit` is `None`.
    fn apply_jit(
        jit: Option<&crate::change_detector::HashStore>,
        pipeline_name: &str,
        step_index: usize,
        data: &Dataset,
        ctx: &mut Context,
    ) -> Result<(), PipelineError> {
        if let Some(hash_store) = jit {
            if hash_store.check_and_record(pipeline_name, step_index, data)? {
                ctx.jit_steps_skipped += 1;
            }
        }
        Ok(())
    }

    /// Run a single node outside a concurrent group, logging its step record
    /// directly onto `ctx` (the shared driver context, since a solo-node
    /// level has no sibling to isolate from).
    async fn run_node(
        dag: &ExecutionDAG,
        node_id: &str,
        results: &HashMap<String, NodeResult>,
        initial_data: &Dataset,
        ctx: &mut Context,
        step_index: usize,
        on_error: OnError,
    ) -> Result<Option<NodeResult>, PipelineError> {
        let mut node_ctx = ctx.child();
        let outcome = run_node_isolated(dag, node_id, results, initial_data, &mut node_ctx, on_error).await;
        ctx.merge_vars_from(&node_ctx);
        let node = &dag.nodes[node_id];
        match outcome? {
            Some(result) => {
                ctx.log_step(step_index, node.step_type.clone(), result.data.len(), result.duration_ms, result.errors.clone());
                Ok(Some(result))
            }
            None => {
                ctx.log_step(step_index, node.step_type.clone(), 0, 0.0, Vec::new());
                Ok(None)
            }
        }
    }
}

/// Resolve inputs, dispatch by strategy, and translate a failing step into
/// the `on_error` policy. Returns `Ok(None)` when `on_error = skip` swallowed
/// a step error (downstream sees the previous dataset, carried by the
/// caller's `results` map staying untouched for this node... except a
/// skipped node still needs *some* output to feed its own successors, so on
/// skip we fall back to the node's primary input unchanged).
async fn run_node_isolated(
    dag: &ExecutionDAG,
    node_id: &str,
    results: &HashMap<String, NodeResult>,
    initial_data: &Dataset,
    node_ctx: &mut Context,
    on_error: OnError,
) -> Result<Option<NodeResult>, PipelineError> {
    let node = &dag.nodes[node_id];
    let preds = dag.predecessors(node_id);

    let primary = if preds.is_empty() {
        initial_data.clone()
    } else {
        results.get(&preds[0]).map(|r| r.data.clone()).unwrap_or_default()
    };
    node_ctx.set_data(primary.clone());

    for edge in dag.in_edges(node_id) {
        if edge.port == "default" || edge.source == preds.first().cloned().unwrap_or_default() {
            continue;
        }
        if let Some(result) = results.get(&edge.source) {
            node_ctx.inputs.insert(edge.port.clone(), result.data.clone());
        }
    }

    let started = Instant::now();

    let outcome = if node.step_type == "_fused" {
        run_fused(node, node_ctx).await
    } else {
        let step = node_ctx.registry.get(&node.step_type)?;
        let config = node.public_config();
        let strategy: Strategy = node.strategy.parse().unwrap_or(Strategy::Sync);
        match strategy {
            Strategy::Streaming if step.supports_streaming() => {
                use futures::StreamExt;
                let mut stream = step.execute_stream(&config, node_ctx).await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await {
                    rows.push(row);
                }
                Ok(Dataset::from_rows(rows))
            }
            Strategy::Async => step.execute_async(&config, node_ctx).await,
            Strategy::Multiprocess => step.execute_pooled(&config, node_ctx).await,
            _ => step.execute(&config, node_ctx).await,
        }
    };

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(data) => {
            let schema = Some(DataSchema::infer(&data, SCHEMA_SAMPLE_SIZE));
            Ok(Some(NodeResult { node_id: node_id.to_string(), data, schema, duration_ms, errors: Vec::new() }))
        }
        Err(e) if e.is_quality_gate() => Err(e),
        Err(e) => match on_error {
            OnError::Stop => Err(e),
            OnError::Skip => Ok(Some(NodeResult {
                node_id: node_id.to_string(),
                data: primary,
                schema: None,
                duration_ms,
                errors: vec![e.to_string()],
            })),
        },
    }
}

/// Run a `_fused` node's contained ops sequentially against one shared data
/// list, reusing the same inner context so `compute`/`filter` expressions
/// see the effects of earlier ops in the chain.
async fn run_fused(node: &pipeline_domain::dag::DagNode, node_ctx: &mut Context) -> Result<Dataset, PipelineError> {
    let Some(Value::List(ops)) = node.config.get("_fused_ops") else {
        return Err(PipelineError::Internal(format!("fused node '{}' missing _fused_ops", node.id)));
    };

    let mut data = node_ctx.data.clone();
    for op in ops {
        let Value::Row(op_row) = op else {
            return Err(PipelineError::Internal("fused op entry is not a row".to_string()));
        };
        let Some(Value::String(step_type)) = op_row.get_ref("type") else {
            return Err(PipelineError::Internal("fused op missing 'type'".to_string()));
        };
        let config: IndexMap<String, Value> = match op_row.get_ref("config") {
            Some(Value::Row(c)) => c.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            _ => IndexMap::new(),
        };

        let step = node_ctx.registry.get(step_type)?;
        node_ctx.set_data(data);
        data = step.execute(&config, node_ctx).await?;
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::dag::DagNode;

    fn registry() -> StepRegistry {
        crate::steps::discover()
    }

    fn row(pairs: Vec<(&str, Value)>) -> Row {
        pairs.into_iter().fold(Row::new(), |r, (k, v)| r.with(k, v))
    }

    #[tokio::test]
    async fn runs_single_node_chain() {
        let mut dag = ExecutionDAG::new();
        let mut config = IndexMap::new();
        config.insert("select".to_string(), Value::List(vec![Value::String("a".to_string())]));
        dag.add_node(DagNode::new("n0", "transform").with_config(config));

        let reg = registry();
        let mut ctx = Context::new("t", Default::default(), reg);
        ctx.set_data(Dataset::from_rows(vec![row(vec![("a", Value::Int(1)), ("b", Value::Int(2))])]));

        DagExecutor::run(&dag, &mut ctx, OnError::Stop).await.unwrap();
        assert_eq!(ctx.data.len(), 1);
        assert_eq!(ctx.data.rows()[0].get("a"), Value::Int(1));
        assert_eq!(ctx.data.rows()[0].contains("b"), false);
    }

    #[tokio::test]
    async fn parallel_level_runs_both_branches_and_concatenates_leaves() {
        let mut dag = ExecutionDAG::new();
        dag.add_node(DagNode::new("r", "transform"));
        dag.add_node(DagNode::new("a", "transform"));
        dag.add_node(DagNode::new("b", "transform"));
        dag.add_edge("r", "a", "default");
        dag.add_edge("r", "b", "default");

        let reg = registry();
        let mut ctx = Context::new("t", Default::default(), reg);
        ctx.set_data(Dataset::from_rows(vec![row(vec![("x", Value::Int(1))])]));

        DagExecutor::run(&dag, &mut ctx, OnError::Stop).await.unwrap();
        // both 'a' and 'b' are leaves fed from the same root output
        assert_eq!(ctx.data.len(), 2);
    }

    #[tokio::test]
    async fn on_error_skip_carries_primary_input_forward() {
        let mut dag = ExecutionDAG::new();
        let mut bad_config = IndexMap::new();
        bad_config.insert("filter".to_string(), Value::String("not_a_field(((".to_string()));
        dag.add_node(DagNode::new("n0", "transform").with_config(bad_config));

        let reg = registry();
        let mut ctx = Context::new("t", Default::default(), reg);
        ctx.set_data(Dataset::from_rows(vec![row(vec![("a", Value::Int(1))])]));

        DagExecutor::run(&dag, &mut ctx, OnError::Skip).await.unwrap();
        assert_eq!(ctx.data.len(), 1);
        assert_eq!(ctx.results[0].errors.is_empty(), false);
    }
}
