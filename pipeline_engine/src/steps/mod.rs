// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Built-In Steps
//!
//! One module per step type, each exposing a `meta() -> StepMeta` function
//! and a zero-sized `Step` implementor. [`discover`] registers all of them
//! into a fresh [`StepRegistry`], which is what the driver hands every
//! pipeline run.

pub mod aggregate;
pub mod branch;
pub mod cache;
pub mod clean;
pub mod fetch;
pub mod file;
pub mod guard;
pub mod join;
pub mod load;
pub mod parallel;
pub mod scrape;
pub mod shell;
pub mod subpipeline;
pub mod support;
pub mod transform;

use pipeline_domain::registry::StepRegistry;

/// Build a [`StepRegistry`] with every built-in step type registered.
pub fn discover() -> StepRegistry {
    let registry = StepRegistry::new();

    registry.register("aggregate", || Box::new(aggregate::AggregateStep), aggregate::meta());
    registry.register("branch", || Box::new(branch::BranchStep), branch::meta());
    registry.register("cache", || Box::new(cache::CacheStep), cache::meta());
    registry.register("clean", || Box::new(clean::CleanStep), clean::meta());
    registry.register("fetch", || Box::new(fetch::FetchStep), fetch::meta());
    registry.register("file", || Box::new(file::FileStep), file::meta());
    registry.register("guard", || Box::new(guard::GuardStep), guard::meta());
    registry.register("join", || Box::new(join::JoinStep), join::meta());
    registry.register("load", || Box::new(load::LoadStep), load::meta());
    registry.register("parallel", || Box::new(parallel::ParallelStep), parallel::meta());
    registry.register("scrape", || Box::new(scrape::ScrapeStep), scrape::meta());
    registry.register("shell", || Box::new(shell::ShellStep), shell::meta());
    registry.register("transform", || Box::new(transform::TransformStep), transform::meta());

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_built_in_step() {
        let registry = discover();
        for name in [
            "aggregate", "branch", "cache", "clean", "fetch", "file", "guard", "join", "load", "parallel", "scrape", "shell",
            "transform",
        ] {
            assert!(registry.contains(name), "missing step type '{name}'");
        }
    }
}
