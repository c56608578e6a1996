// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Context
//!
//! [`Context`] is the mutable, run-scoped state threaded through execution:
//! the current dataset, named variables (including the reserved
//! `_pipeline_name`), per-port inputs for multi-input DAG nodes, the
//! step-outcome log, and a few accounting counters (memory peak, JIT skips).
//!
//! The driver owns one `Context` per run and mutates it sequentially; the
//! executor hands each DAG node an isolated clone so that sibling nodes in
//! the same parallel level cannot observe each other's writes — only
//! variables propagate back, last-writer-wins by completion order (see
//! `pipeline-engine`'s executor for the merge point).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::expr::ExprCache;
use crate::ports::MetricsStore;
use crate::registry::StepRegistry;
use crate::value::{Dataset, Value};

/// Outcome record for a single executed step, logged with zero-based
/// sequential numbering across the whole DAG (not per parallel level).
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_index: usize,
    pub step_type: String,
    pub row_count: usize,
    pub duration_ms: f64,
    pub errors: Vec<String>,
}

/// Mutable, run-scoped execution state.
#[derive(Debug, Clone)]
pub struct Context {
    pub data: Dataset,
    pub vars: HashMap<String, Value>,
    /// Secondary inputs for multi-input nodes, keyed by port name (e.g. a
    /// join's `input_1`).
    pub inputs: IndexMap<String, Dataset>,
    pub results: Vec<StepRecord>,
    pub memory_peak_mb: f64,
    pub peak_buffer_rows: usize,
    pub streaming: bool,
    pub jit_steps_skipped: usize,
    /// Handle back to the step registry, so a step that itself composes
    /// sub-pipelines (`branch`, `parallel`) can resolve and run nested steps
    /// without the executor special-casing them.
    pub registry: StepRegistry,
    /// Shared, bounded-LRU cache of compiled expressions, reused across every
    /// step of a run so a `compute`/`filter`/`when` expression re-used across
    /// rows (or across nodes, e.g. a fused chain) is parsed once.
    pub expr_cache: Arc<ExprCache>,
    /// The run's metrics store, if one is configured, so `guard`'s andon
    /// check can compare the current row count against historical
    /// averages without the executor special-casing that one step.
    pub metrics: Option<Arc<dyn MetricsStore>>,
    started_at: Instant,
}

impl Context {
    pub fn new(pipeline_name: impl Into<String>, vars: HashMap<String, Value>, registry: StepRegistry) -> Self {
        let mut vars = vars;
        vars.insert(
            "_pipeline_name".to_string(),
            Value::String(pipeline_name.into()),
        );
        Self {
            data: Dataset::new(),
            vars,
            inputs: IndexMap::new(),
            results: Vec::new(),
            memory_peak_mb: 0.0,
            peak_buffer_rows: 0,
            streaming: false,
            jit_steps_skipped: 0,
            registry,
            expr_cache: Arc::new(ExprCache::default()),
            metrics: None,
            started_at: Instant::now(),
        }
    }

    /// Attach a metrics store handle (builder-style, used by the driver
    /// right after construction).
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsStore>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Per-node child context: inherits `vars` and the pipeline name, starts
    /// with empty `data`/`inputs`/`results` so a node's writes cannot leak
    /// to siblings in the same parallel level.
    pub fn child(&self) -> Self {
        Self {
            data: Dataset::new(),
            vars: self.vars.clone(),
            inputs: IndexMap::new(),
            results: Vec::new(),
            memory_peak_mb: 0.0,
            peak_buffer_rows: 0,
            streaming: self.streaming,
            jit_steps_skipped: 0,
            registry: self.registry.clone(),
            expr_cache: self.expr_cache.clone(),
            metrics: self.metrics.clone(),
            started_at: self.started_at,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        match self.vars.get("_pipeline_name") {
            Some(Value::String(s)) => s.as_str(),
            _ => "",
        }
    }

    pub fn set_data(&mut self, data: Dataset) {
        self.peak_buffer_rows = self.peak_buffer_rows.max(data.len());
        self.data = data;
    }

    pub fn log_step(
        &mut self,
        step_index: usize,
        step_type: impl Into<String>,
        row_count: usize,
        duration_ms: f64,
        errors: Vec<String>,
    ) {
        self.results.push(StepRecord {
            step_index,
            step_type: step_type.into(),
            row_count,
            duration_ms,
            errors,
        });
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    /// A short human-readable summary used for Kanban item annotation.
    pub fn summary(&self) -> String {
        format!(
            "{} rows, {} steps, {:.0}ms",
            self.data.len(),
            self.results.len(),
            self.elapsed_ms()
        )
    }

    /// Merge vars from a completed child context back into `self`.
    /// Last-writer-wins: the caller is expected to invoke this in the order
    /// sibling nodes actually complete (see the Open Question on concurrent
    /// var merging — the merge policy is intentionally unspecified beyond
    /// "last call wins").
    pub fn merge_vars_from(&mut self, child: &Context) {
        for (k, v) in &child.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }
}
