// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Ports
//!
//! Trait contracts satisfied by concrete infrastructure adapters in
//! `pipeline-engine` ([`MetricsStore`] by a SQLite-backed store,
//! [`KanbanStore`] and [`CheckpointStore`] by JSON-file-backed stores).
//! Kept here, in the domain, so the driver can depend on the contract
//! without depending on a storage technology — the same dependency-inversion
//! shape as the upstream `PipelineRepository`/`StageExecutor` ports.
//!
//! ## Best-Effort Persistence
//!
//! Per the error-handling design, metrics and Kanban persistence failures
//! must never propagate out of a pipeline run — the pipeline's own result
//! is the source of truth. Callers of these ports are expected to log and
//! swallow errors from `record_run`/`update_state`/`save`, not `?` them into
//! the run's result.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::value::Value;

/// One row of the `pipeline_runs` metrics table.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub pipeline_name: String,
    pub pipeline_hash: String,
    pub started_at: f64,
    pub finished_at: f64,
    pub total_rows: usize,
    pub total_duration_ms: f64,
    pub status: String,
    pub error_message: Option<String>,
    /// Per-step outcome summaries, stored as the `steps_json` column.
    pub steps_json: String,
    pub memory_peak_mb: f64,
    pub peak_buffer_rows: usize,
}

/// Port for the run-metrics store (KAIZEN): a single append-only table of
/// completed/failed runs, queryable by pipeline name.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn record_run(&self, record: RunRecord) -> Result<(), PipelineError>;

    /// Most recent runs for a pipeline, newest first, capped at `limit`.
    async fn recent_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>, PipelineError>;

    /// Mean `total_rows` across prior completed runs for a pipeline (used
    /// by `guard`'s andon check); `None` when there is no history.
    async fn mean_row_count(&self, pipeline_name: &str) -> Result<Option<f64>, PipelineError>;

    /// Distinct pipeline names with at least one recorded run, for the
    /// `metrics` command's cross-pipeline dashboard.
    async fn pipeline_names(&self) -> Result<Vec<String>, PipelineError>;

    async fn close(&self) -> Result<(), PipelineError>;
}

/// Kanban item lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KanbanState {
    Backlog,
    InProgress,
    Done,
    Failed,
}

impl KanbanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KanbanState::Backlog => "backlog",
            KanbanState::InProgress => "in_progress",
            KanbanState::Done => "done",
            KanbanState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KanbanItem {
    pub id: String,
    pub pipeline_file: String,
    pub pipeline_name: String,
    pub variables: HashMap<String, Value>,
    pub state: KanbanState,
    pub created_at: f64,
    pub updated_at: f64,
    pub error: Option<String>,
    pub summary: Option<String>,
}

/// Port for the Kanban board (pull-based queue over backlog pipelines).
#[async_trait]
pub trait KanbanStore: Send + Sync {
    async fn add(
        &self,
        pipeline_file: &str,
        pipeline_name: &str,
        variables: HashMap<String, Value>,
    ) -> Result<String, PipelineError>;

    /// Pull the oldest backlog item into `in_progress`, returning it.
    async fn pull_next(&self) -> Result<Option<KanbanItem>, PipelineError>;

    async fn update_state(
        &self,
        item_id: &str,
        state: KanbanState,
        error: Option<String>,
        summary: Option<String>,
    ) -> Result<(), PipelineError>;

    /// All items grouped by state, for `board` display.
    async fn board(&self) -> Result<HashMap<String, Vec<KanbanItem>>, PipelineError>;

    async fn get_item(&self, item_id: &str) -> Result<Option<KanbanItem>, PipelineError>;
}

/// Saved state for resuming a failed run from its last completed step.
#[derive(Debug, Clone)]
pub struct CheckpointState {
    pub completed_step: usize,
    pub timestamp: f64,
    pub data: crate::value::Dataset,
    pub vars: HashMap<String, Value>,
}

/// Port for per-pipeline checkpoint persistence, written atomically at step
/// boundaries (per the concurrency model's resource policy).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(
        &self,
        pipeline_name: &str,
        step_index: usize,
        data: &crate::value::Dataset,
        vars: &HashMap<String, Value>,
    ) -> Result<(), PipelineError>;

    async fn load(&self, pipeline_name: &str) -> Result<Option<CheckpointState>, PipelineError>;

    async fn clear(&self, pipeline_name: &str) -> Result<(), PipelineError>;

    async fn exists(&self, pipeline_name: &str) -> Result<bool, PipelineError>;
}
