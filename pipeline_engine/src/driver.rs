// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Driver
//!
//! One-shot run orchestrator: builds a `Context`, marks the optional Kanban
//! item `in_progress`, runs the planner and executor (or, on a requested
//! resume with a saved checkpoint, a legacy sequential path starting right
//! after the last completed step), then — in a guaranteed-exit scope —
//! persists metrics, closes the metrics store, updates Kanban to
//! `done`/`failed`, and clears the checkpoint on success.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline_domain::ports::{CheckpointStore, KanbanState, KanbanStore, MetricsStore, RunRecord};
use pipeline_domain::{Context, Dataset, OnError, PipelineDefinition, PipelineError, StepRegistry, Value};

use crate::change_detector::HashStore;
use crate::planner::Planner;

/// Result of a completed (successful or failed) run, everything the CLI's
/// `run` command needs to print a summary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub pipeline_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub total_rows: usize,
    pub total_duration_ms: f64,
    pub memory_peak_mb: f64,
    pub jit_steps_skipped: usize,
    pub step_summaries: Vec<(String, usize, f64, Vec<String>)>,
}

/// Optional collaborators a run may be wired up with; all are best-effort
/// from the driver's point of view except the checkpoint, which gates the
/// resume path.
#[derive(Default)]
pub struct DriverOptions {
    pub metrics: Option<Arc<dyn MetricsStore>>,
    pub kanban: Option<Arc<dyn KanbanStore>>,
    pub kanban_item_id: Option<String>,
    pub checkpoint: Option<Arc<dyn CheckpointStore>>,
    pub hash_store: Option<Arc<HashStore>>,
    pub resume: bool,
}

pub struct PipelineDriver;

fn pipeline_hash(def: &PipelineDefinition) -> String {
    use sha2::{Digest, Sha256};
    let text = serde_json::to_string(def).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().iter().take(8).map(|b| format!("{b:02x}")).collect()
}

impl PipelineDriver {
    /// Run `def` end to end, returning the outcome whether it succeeded or
    /// failed. Never panics on a step error; `on_error = stop` (or a
    /// quality-gate violation, which always stops) surfaces as
    /// `RunOutcome { success: false, .. }` rather than a propagated `Err`,
    /// matching the CLI's "print one line, exit 1" contract — the `Err`
    /// variant is reserved for definition errors caught before anything ran.
    pub async fn run(def: &PipelineDefinition, registry: &StepRegistry, opts: DriverOptions) -> Result<RunOutcome, PipelineError> {
        def.validate_shape()?;

        let started_wall = now_secs();
        let mut ctx = Context::new(def.name.clone(), def.vars.clone(), registry.clone());
        if let Some(metrics) = &opts.metrics {
            ctx = ctx.with_metrics(metrics.clone());
        }

        if let Some(kanban) = &opts.kanban {
            if let Some(item_id) = &opts.kanban_item_id {
                let _ = kanban.update_state(item_id, KanbanState::InProgress, None, None).await;
            }
        }

        let run_result = if opts.resume {
            match Self::try_resume(def, &mut ctx, &opts).await? {
                Some(()) => Ok(()),
                None => Self::run_fresh(def, registry, &mut ctx, &opts).await,
            }
        } else {
            Self::run_fresh(def, registry, &mut ctx, &opts).await
        };

        let finished_wall = now_secs();
        let success = run_result.is_ok();
        let error_message = run_result.as_ref().err().map(|e| e.to_string());

        if let Some(metrics) = &opts.metrics {
            let steps_json = serde_json::to_string(
                &ctx.results.iter().map(|r| serde_json::json!({"step_index": r.step_index, "step_type": r.step_type, "row_count": r.row_count, "duration_ms": r.duration_ms, "errors": r.errors})).collect::<Vec<_>>(),
            )
            .unwrap_or_else(|_| "[]".to_string());

            let record = RunRecord {
                pipeline_name: def.name.clone(),
                pipeline_hash: pipeline_hash(def),
                started_at: started_wall,
                finished_at: finished_wall,
                total_rows: ctx.data.len(),
                total_duration_ms: finished_wall - started_wall,
                status: if success { "success".to_string() } else { "failed".to_string() },
                error_message: error_message.clone(),
                steps_json,
                memory_peak_mb: ctx.memory_peak_mb,
                peak_buffer_rows: ctx.peak_buffer_rows,
            };
            let _ = metrics.record_run(record).await;
            let _ = metrics.close().await;
        }

        if let Some(kanban) = &opts.kanban {
            if let Some(item_id) = &opts.kanban_item_id {
                let state = if success { KanbanState::Done } else { KanbanState::Failed };
                let _ = kanban.update_state(item_id, state, error_message.clone(), Some(ctx.summary())).await;
            }
        }

        if let Some(checkpoint) = &opts.checkpoint {
            if success {
                let _ = checkpoint.clear(&def.name).await;
            } else if def.checkpoint {
                let last_completed = ctx.results.len().saturating_sub(1);
                let _ = checkpoint.save(&def.name, last_completed, &ctx.data, &ctx.vars).await;
            }
        }

        let step_summaries = ctx.results.iter().map(|r| (r.step_type.clone(), r.row_count, r.duration_ms, r.errors.clone())).collect();

        Ok(RunOutcome {
            pipeline_name: def.name.clone(),
            success,
            error: error_message,
            total_rows: ctx.data.len(),
            total_duration_ms: finished_wall - started_wall,
            memory_peak_mb: ctx.memory_peak_mb,
            jit_steps_skipped: ctx.jit_steps_skipped,
            step_summaries,
        })
    }

    /// Plan and execute fresh, applying JIT hashing per completed step when
    /// `def.jit` is set.
    async fn run_fresh(def: &PipelineDefinition, registry: &StepRegistry, ctx: &mut Context, opts: &DriverOptions) -> Result<(), PipelineError> {
        let dag = Planner::plan(def, registry)?;
        let jit_store = if def.jit { opts.hash_store.as_deref() } else { None };
        crate::executor::DagExecutor::run_with_jit(&dag, ctx, def.on_error, jit_store).await
    }

    /// Reload a saved checkpoint and continue the linear `steps` list
    /// sequentially, starting right after the last completed step. DAG
    /// execution has no reentrant state, so resume only ever exercises the
    /// plain step-list path, never the planner/executor.
    ///
    /// Returns `Ok(Some(()))` when a checkpoint was found and applied,
    /// `Ok(None)` when there is nothing to resume from (the caller should
    /// fall back to a fresh run).
    async fn try_resume(def: &PipelineDefinition, ctx: &mut Context, opts: &DriverOptions) -> Result<Option<()>, PipelineError> {
        let Some(checkpoint) = &opts.checkpoint else { return Ok(None) };
        let Some(state) = checkpoint.load(&def.name).await.ok().flatten() else { return Ok(None) };

        ctx.set_data(state.data);
        for (k, v) in state.vars {
            ctx.vars.insert(k, v);
        }

        let remaining = def.steps.iter().enumerate().skip(state.completed_step + 1);
        for (i, step_def) in remaining {
            let step = ctx.registry.get(&step_def.step_type)?;
            let started = std::time::Instant::now();
            let outcome = step.execute(&step_def.config, ctx).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(data) => {
                    let row_count = data.len();
                    ctx.set_data(data);
                    ctx.log_step(i, step_def.step_type.clone(), row_count, duration_ms, Vec::new());
                    if let Some(checkpoint) = &opts.checkpoint {
                        let _ = checkpoint.save(&def.name, i, &ctx.data, &ctx.vars).await;
                    }
                }
                Err(e) if e.is_quality_gate() => return Err(e),
                Err(e) => match def.on_error {
                    OnError::Stop => return Err(e),
                    OnError::Skip => {
                        ctx.log_step(i, step_def.step_type.clone(), ctx.data.len(), duration_ms, vec![e.to_string()]);
                    }
                },
            }
        }

        Ok(Some(()))
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipeline_def::StepDef;

    fn step(step_type: &str, config: Vec<(&str, Value)>) -> StepDef {
        StepDef { step_type: step_type.to_string(), config: config.into_iter().map(|(k, v)| (k.to_string(), v)).collect() }
    }

    #[tokio::test]
    async fn runs_a_linear_pipeline_to_completion() {
        let def = PipelineDefinition {
            name: "t".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps: vec![step("transform", vec![("select", Value::List(vec![Value::String("a".to_string())]))])],
            graph: indexmap::IndexMap::new(),
            on_error: OnError::Stop,
            jit: false,
            checkpoint: false,
        };
        let registry = crate::steps::discover();
        let outcome = PipelineDriver::run(&def, &registry, DriverOptions::default()).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn definition_errors_surface_before_anything_runs() {
        let def = PipelineDefinition {
            name: "".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps: Vec::new(),
            graph: indexmap::IndexMap::new(),
            on_error: OnError::Stop,
            jit: false,
            checkpoint: false,
        };
        let registry = crate::steps::discover();
        assert!(PipelineDriver::run(&def, &registry, DriverOptions::default()).await.is_err());
    }
}
