// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `run` Command
//!
//! Parses and (optionally dry-)runs a pipeline file.

use std::path::Path;
use std::sync::Arc;

use pipeline_domain::ports::{CheckpointStore, MetricsStore};
use pipeline_domain::{PipelineError, StepRegistry};
use pipeline_engine::change_detector::HashStore;
use pipeline_engine::driver::{DriverOptions, PipelineDriver};

use crate::yaml::parse_pipeline_file;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    file: &Path,
    vars: &[(String, String)],
    dry_run: bool,
    resume: bool,
    verbose: bool,
    registry: &StepRegistry,
    metrics: Option<Arc<dyn MetricsStore>>,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    hash_store: Option<Arc<HashStore>>,
) -> Result<(), PipelineError> {
    let def = parse_pipeline_file(file, vars)?;

    if dry_run {
        println!("Pipeline: {}", def.name);
        if !def.description.is_empty() {
            println!("Description: {}", def.description);
        }
        let step_count = if def.is_graph() { def.graph.len() } else { def.steps.len() };
        println!("Steps: {step_count}");
        for (i, step) in def.steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step.step_type);
        }
        for (id, node) in &def.graph {
            println!("  {id}: {}", node.step_type);
        }
        println!("Checkpoint: {}", if def.checkpoint { "enabled" } else { "disabled" });
        def.validate_shape()?;
        println!("Validation: OK");
        return Ok(());
    }

    println!("Running pipeline: {}", def.name);
    if verbose {
        let step_count = if def.is_graph() { def.graph.len() } else { def.steps.len() };
        println!("  {step_count} steps, checkpoint={}", def.checkpoint);
    }

    let opts = DriverOptions { metrics: metrics.clone(), checkpoint, hash_store, resume, ..Default::default() };
    let outcome = PipelineDriver::run(&def, registry, opts).await?;

    if outcome.success {
        println!("--- Pipeline Complete ---");
        println!("Total rows: {}", outcome.total_rows);
        println!("Total duration: {:.1}ms", outcome.total_duration_ms);
        if outcome.memory_peak_mb > 0.0 {
            println!("Peak memory: {:.1}MB", outcome.memory_peak_mb);
        }

        for (step_type, row_count, duration_ms, errors) in &outcome.step_summaries {
            println!("{step_type}: {row_count} rows in {duration_ms:.1}ms ({} errors)", errors.len());
        }
        if outcome.jit_steps_skipped > 0 {
            println!("JIT: {} steps skipped (unchanged)", outcome.jit_steps_skipped);
        }
        if metrics.is_some() {
            println!("[metrics recorded]");
        }
        Ok(())
    } else {
        let message = outcome.error.clone().unwrap_or_else(|| "unknown error".to_string());
        eprintln!("Error: {message}");
        if def.checkpoint {
            eprintln!("Checkpoint saved. Resume with: pipeline-cli run {} --resume", file.display());
        }
        Err(PipelineError::step_runtime(outcome.pipeline_name, message))
    }
}
