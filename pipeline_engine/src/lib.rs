// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Engine
//!
//! Infrastructure layer for the pipeline execution engine: the planner that
//! rewrites a raw [`pipeline_domain::ExecutionDAG`] into a fused,
//! strategy-annotated execution plan; the DAG executor that runs it;
//! the concurrency primitives (`streaming`) the executor and steps lean on
//! for backpressure; the built-in step registrations (`steps`); the concrete
//! adapters for the domain's repository ports (`stores`); and the one-shot
//! [`driver::PipelineDriver`] that ties a run together end to end.
//!
//! ## Layering
//!
//! This crate depends on `pipeline-domain` and never the reverse. It is the
//! "infrastructure" ring of the workspace: everything here is free to use a
//! tokio runtime, `tracing`, `reqwest`, `sqlx`, and the other concrete crates
//! the domain deliberately excludes.
//!
//! ## Module Overview
//!
//! - [`streaming`] — `BatchBuffer`, `BackpressureChannel`,
//!   `AdaptiveSemaphore`: the bounded-memory concurrency primitives.
//! - [`steps`] — built-in `Step` implementations and `discover()`, which
//!   idempotently registers all of them into a [`pipeline_domain::StepRegistry`].
//! - [`planner`] — the five-pass optimizer from raw DAG to execution plan.
//! - [`executor`] — the level-by-level concurrent DAG executor.
//! - [`stores`] — SQLite metrics store, JSON Kanban board, file-backed
//!   checkpoints: the concrete adapters for the domain's ports.
//! - [`change_detector`] — incremental per-step content hashing for JIT
//!   skip decisions.
//! - [`driver`] — [`driver::PipelineDriver`], the one-shot run orchestrator.

pub mod change_detector;
pub mod driver;
pub mod executor;
pub(crate) mod jsonpath;
pub mod planner;
pub mod steps;
pub mod stores;
pub mod streaming;
pub(crate) mod uri;
pub(crate) mod url_pattern;

pub use driver::PipelineDriver;
pub use executor::DagExecutor;
pub use planner::Planner;
