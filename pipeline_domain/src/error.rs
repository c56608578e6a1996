// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Error
//!
//! A single error enum shared by every layer of the workspace. Errors never
//! leak the concrete type of the library that raised them (no `sqlx::Error`,
//! no `reqwest::Error` in a public signature) — adapters fold their
//! underlying errors into one of the five variants below, with the original
//! message preserved as context.
//!
//! ## The Five Kinds
//!
//! - [`PipelineError::Definition`] — the pipeline YAML or graph description
//!   itself is malformed (unknown predecessor, duplicate node id, missing
//!   required config key).
//! - [`PipelineError::Expression`] — a `transform`/`clean`/`guard` expression
//!   failed to parse or referenced a forbidden construct at compile time.
//! - [`PipelineError::QualityGate`] — a `guard` step's condition was not
//!   satisfied and `on_fail` was `stop`.
//! - [`PipelineError::StepRuntime`] — a step failed while executing (network
//!   error, file not found, non-zero shell exit, join key mismatch).
//! - [`PipelineError::Internal`] — anything that should never happen in
//!   practice (a planner invariant violated, a poisoned lock) — a bug, not a
//!   user-facing condition.

use thiserror::Error;

/// The unified error type for the pipeline domain, engine, and CLI.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline definition (YAML, linear steps, or explicit graph) is
    /// invalid: unknown step type, a node references an undefined
    /// predecessor, a cycle was detected, or a required config key is
    /// missing.
    #[error("pipeline definition error: {0}")]
    Definition(String),

    /// An expression failed to parse, referenced a blocked name, or used a
    /// construct outside the restricted grammar.
    #[error("expression error: {0}")]
    Expression(String),

    /// A `guard` step's condition evaluated false and `on_fail: stop` (the
    /// default) was in effect.
    #[error("quality gate failed: {0}")]
    QualityGate(String),

    /// A step failed while running: I/O, network, subprocess, or
    /// step-specific business-rule violation (e.g. join key not found).
    #[error("step '{step}' failed: {message}")]
    StepRuntime { step: String, message: String },

    /// An invariant the rest of the system assumes was violated. These
    /// indicate a defect, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Construct a [`PipelineError::StepRuntime`] for the named step.
    pub fn step_runtime(step: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::StepRuntime {
            step: step.into(),
            message: message.into(),
        }
    }

    /// `true` for errors that represent a quality-gate failure specifically,
    /// used by the driver to decide checkpoint semantics on `on_error: skip`.
    pub fn is_quality_gate(&self) -> bool {
        matches!(self, PipelineError::QualityGate(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PipelineError>;
