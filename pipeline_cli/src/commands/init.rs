// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `init` Command
//!
//! Writes a starter `pipeline.yaml` skeleton: a `file` read, a `transform`,
//! and a `load` to stdout.

use pipeline_domain::PipelineError;

const TEMPLATE: &str = r#"name: {name}
description: Starter pipeline, edit me.
vars: {}

steps:
  - file:
      action: read
      path: input.csv
      format: csv
  - transform:
      select: []
  - load:
      target: stdout
"#;

pub fn run(name: Option<String>) -> Result<(), PipelineError> {
    let name = name.unwrap_or_else(|| "my_pipeline".to_string());
    let path = std::path::Path::new("pipeline.yaml");

    if path.exists() {
        return Err(PipelineError::Definition(format!("{} already exists, refusing to overwrite", path.display())));
    }

    let contents = TEMPLATE.replace("{name}", &name);
    std::fs::write(path, contents).map_err(|e| PipelineError::Internal(format!("writing {}: {e}", path.display())))?;

    println!("Created {}", path.display());
    println!("Run it with: pipeline-cli run {}", path.display());
    Ok(())
}
