// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Step Contract
//!
//! The unified trait every processing stage implements, whether built-in
//! (`fetch`, `transform`, `join`, ...) or a future custom stage, plus the
//! static [`StepMeta`] descriptor the planner reads to make fusion,
//! strategy, and projection decisions without ever special-casing a step
//! name.
//!
//! Concrete step implementations live in `pipeline-engine` (they need
//! tokio, reqwest, sqlx, ...); this crate only defines the contract.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use indexmap::IndexMap;

use crate::context::Context;
use crate::error::PipelineError;
use crate::schema::DataSchema;
use crate::value::{Dataset, Row, Value};

/// Resolved execution strategy for a DAG node, assigned by the planner's
/// strategy-annotation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Sync,
    Streaming,
    Async,
    Multiprocess,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sync => "sync",
            Strategy::Streaming => "streaming",
            Strategy::Async => "async",
            Strategy::Multiprocess => "multiprocess",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Strategy::Sync),
            "streaming" => Ok(Strategy::Streaming),
            "async" => Ok(Strategy::Async),
            "multiprocess" => Ok(Strategy::Multiprocess),
            other => Err(PipelineError::Internal(format!(
                "unknown execution strategy '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a step type can natively stream rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingCapability {
    /// Never streams; `execute_stream` falls back to draining `execute()`.
    None,
    /// Always streams when selected.
    Always,
    /// Streams unless the node's config contains one of its
    /// `streaming_breakers` keys.
    Conditional,
}

/// Static, per-step-type metadata read by the planner. One instance per
/// registered step type, independent of any particular node's config.
#[derive(Debug, Clone)]
pub struct StepMeta {
    pub default_strategy: Strategy,
    /// `(row-count threshold, strategy)` pairs evaluated in ascending
    /// threshold order; the last applicable rule wins.
    pub strategy_escalations: Vec<(usize, Strategy)>,
    /// Config keys whose presence on a node forces full materialization,
    /// suppressing a `streaming` escalation and blocking operator fusion.
    pub streaming_breakers: Vec<&'static str>,
    pub streaming: StreamingCapability,
    pub fusable: bool,
    pub is_source: bool,
    pub description: &'static str,
    pub config_docs: Vec<(&'static str, &'static str)>,
    /// Alternative sets of config keys, at least one of which must be
    /// present; used by `lint`. Empty means "no requirement".
    pub required_config: Vec<&'static str>,
}

impl Default for StepMeta {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Sync,
            strategy_escalations: Vec::new(),
            streaming_breakers: Vec::new(),
            streaming: StreamingCapability::None,
            fusable: false,
            is_source: false,
            description: "",
            config_docs: Vec::new(),
            required_config: Vec::new(),
        }
    }
}

/// A single operation over a [`Dataset`], constructed per DAG-node
/// execution from its resolved config and a fresh [`Context`].
///
/// All methods but `execute` have a default that falls back to `execute`,
/// matching the reference step contract: overriding is opt-in per
/// capability (native streaming, true async I/O, CPU-bound pooling).
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step to completion, returning the full output dataset.
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError>;

    /// I/O-bound execution path. Default delegates to [`Step::execute`].
    async fn execute_async(
        &self,
        config: &IndexMap<String, Value>,
        ctx: &mut Context,
    ) -> Result<Dataset, PipelineError> {
        self.execute(config, ctx).await
    }

    /// CPU-bound, parallelizable execution path. Default delegates to
    /// [`Step::execute`].
    async fn execute_pooled(
        &self,
        config: &IndexMap<String, Value>,
        ctx: &mut Context,
    ) -> Result<Dataset, PipelineError> {
        self.execute(config, ctx).await
    }

    /// Streaming execution path. Default drains [`Step::execute`] into a
    /// stream of its rows; override for true lazy emission.
    async fn execute_stream<'a>(
        &'a self,
        config: &'a IndexMap<String, Value>,
        ctx: &'a mut Context,
    ) -> Result<BoxStream<'a, Row>, PipelineError> {
        let dataset = self.execute(config, ctx).await?;
        Ok(Box::pin(stream::iter(dataset.into_rows())))
    }

    /// Whether this step type advertises native streaming. Defaults to
    /// `false`; `StepMeta.streaming` is the planner-facing declaration, this
    /// is the per-call capability check used by the executor at dispatch
    /// time.
    fn supports_streaming(&self) -> bool {
        false
    }

    fn input_schema(&self) -> Option<DataSchema> {
        None
    }

    fn output_schema(&self, _input: Option<&DataSchema>) -> Option<DataSchema> {
        None
    }
}

/// Factory for a registered step: given nothing (steps are stateless;
/// all per-run state lives in config/context), produce a boxed instance.
pub type StepFactory = fn() -> Box<dyn Step>;
