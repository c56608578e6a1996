// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `validate` Command
//!
//! Parses a pipeline file and checks its shape without running anything.

use std::path::Path;

use pipeline_domain::PipelineError;

use crate::yaml::parse_pipeline_file;

pub fn run(file: &Path) -> Result<(), PipelineError> {
    let result = (|| -> Result<(), PipelineError> {
        let def = parse_pipeline_file(file, &[])?;
        def.validate_shape()?;
        println!("Valid pipeline: {}", def.name);
        if def.is_graph() {
            for (id, node) in &def.graph {
                println!("  {id}: {}", node.step_type);
            }
        } else {
            for (i, step) in def.steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step.step_type);
            }
        }
        Ok(())
    })();

    if let Err(e) = &result {
        eprintln!("Invalid: {e}");
    }
    result
}
