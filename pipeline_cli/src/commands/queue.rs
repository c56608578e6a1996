// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `queue` Command
//!
//! Parses a pipeline file and adds it to the Kanban backlog, storing the
//! resolved `--var` overrides alongside it so `work` can re-run it later
//! without needing the original command line.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pipeline_domain::ports::KanbanStore;
use pipeline_domain::{PipelineError, Value};

use crate::yaml::parse_pipeline_file;

pub async fn run(file: &Path, vars: &[(String, String)], kanban: Arc<dyn KanbanStore>) -> Result<(), PipelineError> {
    let def = parse_pipeline_file(file, vars)?;

    let variables: HashMap<String, Value> = vars.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    let id = kanban.add(&file.display().to_string(), &def.name, variables).await?;

    println!("Queued {} as {id}", def.name);
    println!("Run the backlog with: pipeline-cli work");
    Ok(())
}
