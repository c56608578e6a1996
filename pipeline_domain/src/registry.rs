// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Step Registry
//!
//! A name-keyed registry of step factories and their static [`StepMeta`].
//! The reference implementation populates this by walking a Python package
//! for `@StepRegistry.register` side effects on first use; in a statically
//! compiled host that becomes explicit registration at process start
//! (`pipeline-engine::infrastructure::steps::discover`), guarded so a
//! second call is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::PipelineError;
use crate::step::{Step, StepFactory, StepMeta};

#[derive(Debug)]
struct Registration {
    factory: StepFactory,
    meta: StepMeta,
}

/// Name-keyed registry of step types.
///
/// Cheaply cloneable (`Arc` inside); share one instance across the planner
/// and executor for the duration of a run.
#[derive(Clone, Default, Debug)]
pub struct StepRegistry {
    inner: Arc<RwLock<HashMap<String, Registration>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step type. Re-registering the same name overwrites the
    /// previous entry, so `discover()` can be called more than once
    /// idempotently.
    pub fn register(&self, name: impl Into<String>, factory: StepFactory, meta: StepMeta) {
        self.inner
            .write()
            .insert(name.into(), Registration { factory, meta });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Construct a new instance of the named step type.
    pub fn get(&self, name: &str) -> Result<Box<dyn Step>, PipelineError> {
        let guard = self.inner.read();
        let reg = guard.get(name).ok_or_else(|| {
            PipelineError::Definition(format!(
                "unknown step type: '{name}'. Available: [{}]",
                self.list_types_locked(&guard).join(", ")
            ))
        })?;
        Ok((reg.factory)())
    }

    /// The static metadata for a registered step type.
    pub fn get_meta(&self, name: &str) -> Result<StepMeta, PipelineError> {
        let guard = self.inner.read();
        guard
            .get(name)
            .map(|r| r.meta.clone())
            .ok_or_else(|| PipelineError::Definition(format!("unknown step type: '{name}'")))
    }

    pub fn list_types(&self) -> Vec<String> {
        let guard = self.inner.read();
        self.list_types_locked(&guard)
    }

    fn list_types_locked(&self, guard: &HashMap<String, Registration>) -> Vec<String> {
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }
}
