// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `work` Command
//!
//! Drains the Kanban backlog, oldest first, running each item's pipeline
//! file with its stored variable overrides until the backlog is empty or
//! `--limit` items have been processed (0 means unlimited).

use std::path::Path;
use std::sync::Arc;

use pipeline_domain::ports::{CheckpointStore, KanbanStore, MetricsStore};
use pipeline_domain::{PipelineError, StepRegistry};
use pipeline_engine::change_detector::HashStore;
use pipeline_engine::driver::{DriverOptions, PipelineDriver};

use crate::shutdown::CancellationToken;
use crate::yaml::parse_pipeline_file;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    limit: usize,
    registry: &StepRegistry,
    kanban: Arc<dyn KanbanStore>,
    metrics: Option<Arc<dyn MetricsStore>>,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    hash_store: Option<Arc<HashStore>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let mut processed = 0usize;

    loop {
        if limit > 0 && processed >= limit {
            break;
        }
        if cancel.is_cancelled() {
            println!("Shutdown requested, stopping after {processed} item(s).");
            break;
        }

        let Some(item) = kanban.pull_next().await? else { break };

        let overrides: Vec<(String, String)> = item.variables.iter().map(|(k, v)| (k.clone(), v.to_display_string())).collect();

        let result = run_one(&item.pipeline_file, &overrides, &item.id, registry, &kanban, metrics.clone(), checkpoint.clone(), hash_store.clone()).await;

        match result {
            Ok(outcome) => println!("Done: {} rows in {:.1}ms", outcome.0, outcome.1),
            Err(e) => println!("Failed: {e}"),
        }

        processed += 1;
    }

    println!("Processed {processed} item(s). Check the board: pipeline-cli board");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    pipeline_file: &str,
    overrides: &[(String, String)],
    item_id: &str,
    registry: &StepRegistry,
    kanban: &Arc<dyn KanbanStore>,
    metrics: Option<Arc<dyn MetricsStore>>,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    hash_store: Option<Arc<HashStore>>,
) -> Result<(usize, f64), PipelineError> {
    let def = parse_pipeline_file(Path::new(pipeline_file), overrides)?;

    let opts = DriverOptions {
        metrics,
        kanban: Some(kanban.clone()),
        kanban_item_id: Some(item_id.to_string()),
        checkpoint,
        hash_store,
        resume: false,
    };

    let outcome = PipelineDriver::run(&def, registry, opts).await?;
    if outcome.success {
        Ok((outcome.total_rows, outcome.total_duration_ms))
    } else {
        Err(PipelineError::step_runtime(outcome.pipeline_name, outcome.error.unwrap_or_else(|| "unknown error".to_string())))
    }
}
