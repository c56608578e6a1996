// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Definition
//!
//! The parsed, in-memory form of a pipeline's YAML description. Parsing the
//! YAML text itself (including `{var}`/`$VAR` expansion and the
//! on/off/yes/no key-coercion fixup) is an infrastructure/CLI concern (see
//! `pipeline-cli::yaml`); this module only defines the shape the planner
//! consumes.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single step in the linear `steps:` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub step_type: String,
    pub config: IndexMap<String, Value>,
}

/// A single node in the explicit `graph:` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeDef {
    /// `step` (or the legacy alias `type`).
    pub step_type: String,
    /// Zero or more predecessor node ids. A single string and a list are
    /// both accepted at the parsing boundary and normalized to a `Vec` here.
    pub after: Vec<String>,
    pub config: IndexMap<String, Value>,
}

/// Behavior on a step runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Abort the pipeline on the first step error (default).
    Stop,
    /// Keep the previous dataset, record the error on the step record, and
    /// continue.
    Skip,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Stop
    }
}

/// Parsed pipeline description: exactly one of `steps` or `graph` must be
/// non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vars: HashMap<String, Value>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub graph: IndexMap<String, GraphNodeDef>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub jit: bool,
    #[serde(default)]
    pub checkpoint: bool,
}

impl PipelineDefinition {
    /// `true` when the explicit-graph form is in use rather than the linear
    /// step list.
    pub fn is_graph(&self) -> bool {
        !self.graph.is_empty()
    }

    /// Definition-error checks that don't require the step registry: exactly
    /// one of `steps`/`graph` populated, and (for the graph form) every
    /// `after` id refers to a node declared in the same graph.
    pub fn validate_shape(&self) -> Result<(), crate::error::PipelineError> {
        use crate::error::PipelineError;

        if self.name.trim().is_empty() {
            return Err(PipelineError::Definition(
                "pipeline must have a non-empty 'name' field".to_string(),
            ));
        }

        let has_steps = !self.steps.is_empty();
        let has_graph = !self.graph.is_empty();

        if !has_steps && !has_graph {
            return Err(PipelineError::Definition(
                "pipeline must have 'steps' or 'graph'".to_string(),
            ));
        }
        if has_steps && has_graph {
            return Err(PipelineError::Definition(
                "pipeline must have exactly one of 'steps' or 'graph', not both".to_string(),
            ));
        }

        if has_graph {
            for (node_id, node) in &self.graph {
                for pred in &node.after {
                    if !self.graph.contains_key(pred) {
                        return Err(PipelineError::Definition(format!(
                            "node '{node_id}' references unknown predecessor '{pred}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
