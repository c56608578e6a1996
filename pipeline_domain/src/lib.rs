// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Domain
//!
//! This crate is the domain layer of the adaptive data-pipeline execution
//! engine. It contains the types, traits, and pure business logic shared by
//! every other crate in the workspace: the row/value model, the DAG the
//! planner compiles pipelines into, the `Step` contract that all processing
//! stages implement, the restricted expression language used inside
//! `transform`/`clean`/`guard` configuration, and the repository *ports*
//! (trait contracts) that infrastructure adapters in `pipeline-engine`
//! satisfy.
//!
//! ## Layering
//!
//! Following the same Clean Architecture / DDD split as the rest of the
//! workspace:
//!
//! - **Domain (this crate)**: pure types, the `Step` trait, the DAG model,
//!   the expression evaluator. No tokio runtime, no logging backend, no
//!   concrete storage.
//! - **Infrastructure (`pipeline-engine`)**: the planner, the DAG executor,
//!   the streaming primitives, the concrete `Step` implementations, and the
//!   concrete adapters for the ports defined here (SQLite metrics store,
//!   JSON Kanban board, file-backed checkpoints).
//! - **Bootstrap (`pipeline-cli`)**: the binary entry point, signal
//!   handling, and the clap-based command surface.
//!
//! Dependency inversion holds throughout: this crate defines
//! [`ports::MetricsStore`], [`ports::KanbanStore`], and
//! [`ports::CheckpointStore`] as traits; `pipeline-engine` depends on this
//! crate and implements them, never the other way around.
//!
//! ## Module Overview
//!
//! - [`error`] — the five-variant [`error::PipelineError`] used throughout
//!   the workspace.
//! - [`value`] — [`value::Value`], [`value::Row`], [`value::Dataset`]: the
//!   row-oriented data model every step reads and writes.
//! - [`schema`] — [`schema::Field`] and [`schema::DataSchema`]: typed schema
//!   inference and propagation for projection pushdown.
//! - [`dag`] — [`dag::DagNode`], [`dag::DagEdge`], [`dag::ExecutionDAG`]:
//!   the directed-acyclic-graph model the planner produces and the executor
//!   consumes.
//! - [`context`] — [`context::Context`]: the mutable run-scoped state
//!   (variables, step log, buffering stats) threaded through execution.
//! - [`pipeline_def`] — [`pipeline_def::PipelineDefinition`]: the parsed
//!   form of a pipeline's YAML description.
//! - [`step`] — the [`step::Step`] trait and [`step::StepMeta`] that every
//!   processing stage implements/declares.
//! - [`registry`] — [`registry::StepRegistry`]: the name-keyed registry of
//!   step constructors and metadata.
//! - [`ports`] — repository-style traits satisfied by infrastructure.
//! - [`expr`] — the restricted expression language evaluator used by
//!   `transform`, `clean`, and `guard` configuration.

pub mod context;
pub mod dag;
pub mod error;
pub mod expr;
pub mod pipeline_def;
pub mod ports;
pub mod registry;
pub mod schema;
pub mod step;
pub mod value;

pub use context::Context;
pub use dag::{DagEdge, DagNode, ExecutionDAG};
pub use error::PipelineError;
pub use expr::{CompiledExpr, ExprCache};
pub use pipeline_def::{OnError, PipelineDefinition, StepDef};
pub use registry::StepRegistry;
pub use schema::{DataSchema, Field};
pub use step::{Step, StepMeta, Strategy, StreamingCapability};
pub use value::{Dataset, Row, Value};
