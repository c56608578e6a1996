// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `lint` Command
//!
//! Runs the static linter and prints one line per finding. Unlike every
//! other command, the process exit code here depends on finding severity,
//! not on whether the command itself errored — so this returns whether any
//! `error`-level finding was seen, and `main` decides the exit status from
//! that rather than from `Result::Err`.

use std::path::Path;

use pipeline_domain::{PipelineError, StepRegistry};

use crate::linter::{self, LintLevel};
use crate::yaml::parse_pipeline_file;

pub fn run(file: &Path, registry: &StepRegistry) -> Result<bool, PipelineError> {
    let def = parse_pipeline_file(file, &[])?;
    let findings = linter::lint(&def, registry);

    let mut errors = 0;
    let mut warnings = 0;
    let mut suggestions = 0;

    for finding in &findings {
        let scope = match finding.step_index {
            Some(i) => format!("step {i}"),
            None => "pipeline".to_string(),
        };
        println!("[{}] ({}) {scope}: {}", finding.level.as_str(), finding.principle, finding.message);
        match finding.level {
            LintLevel::Error => errors += 1,
            LintLevel::Warning => warnings += 1,
            LintLevel::Suggestion => suggestions += 1,
        }
    }

    println!("{errors} errors, {warnings} warnings, {suggestions} suggestions");
    Ok(errors > 0)
}
