// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `file` Step
//!
//! Reads a single file as pipeline input (`json`/`csv`/`text`, or `glob` for
//! a directory listing), or writes the current dataset to one.

use async_trait::async_trait;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::get_string_or;

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: true,
        description: "Read or write files (json, csv, text, glob)",
        config_docs: vec![
            ("action", "string — read | glob | write (default read)"),
            ("path", "string — file path, or glob pattern for action: glob"),
            ("format", "string — json | csv | text | auto (default auto)"),
        ],
        required_config: vec!["path"],
    }
}

pub struct FileStep;

fn detect_format(path: &str, fallback: &str) -> String {
    if path.ends_with(".json") {
        "json".to_string()
    } else if path.ends_with(".csv") {
        "csv".to_string()
    } else {
        fallback.to_string()
    }
}

fn read_file(path: &str, format: &str) -> Result<Dataset, PipelineError> {
    let format = if format == "auto" { detect_format(path, "text") } else { format.to_string() };
    match format.as_str() {
        "json" => crate::uri::load_json(path),
        "csv" => crate::uri::load_csv(path),
        _ => {
            let text = std::fs::read_to_string(path).map_err(|e| PipelineError::step_runtime("file", format!("reading '{path}': {e}")))?;
            let rows = text
                .trim()
                .lines()
                .enumerate()
                .map(|(i, line)| Row::new().with("line", Value::String(line.to_string())).with("_index", Value::Int(i as i64)))
                .collect();
            Ok(Dataset::from_rows(rows))
        }
    }
}

fn glob_files(pattern: &str) -> Result<Dataset, PipelineError> {
    let mut paths: Vec<std::path::PathBuf> = glob::glob(pattern)
        .map_err(|e| PipelineError::step_runtime("file", format!("bad glob pattern '{pattern}': {e}")))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let rows = paths
        .into_iter()
        .map(|p| {
            let size = std::fs::metadata(&p).map(|m| m.len()).unwrap_or(0);
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let ext = p.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
            Row::new()
                .with("path", Value::String(p.to_string_lossy().to_string()))
                .with("name", Value::String(name))
                .with("size", Value::Int(size as i64))
                .with("ext", Value::String(ext))
        })
        .collect();
    Ok(Dataset::from_rows(rows))
}

fn write_file(path: &str, format: &str, data: &Dataset) -> Result<(), PipelineError> {
    let format = if format == "auto" { detect_format(path, "json") } else { format.to_string() };
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::step_runtime("file", format!("creating directory: {e}")))?;
        }
    }
    match format.as_str() {
        "csv" if !data.is_empty() => {
            let columns = data.rows()[0].field_names();
            let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::step_runtime("file", format!("opening '{path}': {e}")))?;
            writer.write_record(&columns).map_err(|e| PipelineError::step_runtime("file", format!("writing header: {e}")))?;
            for row in data.rows() {
                let record: Vec<String> = columns.iter().map(|c| row.get(c).to_display_string()).collect();
                writer.write_record(&record).map_err(|e| PipelineError::step_runtime("file", format!("writing row: {e}")))?;
            }
            writer.flush().map_err(|e| PipelineError::step_runtime("file", format!("flushing '{path}': {e}")))
        }
        _ => {
            let rows: Vec<serde_json::Value> = data.rows().iter().map(crate::uri::row_to_json).collect();
            let text = serde_json::to_string_pretty(&rows).map_err(|e| PipelineError::step_runtime("file", format!("serializing: {e}")))?;
            std::fs::write(path, text).map_err(|e| PipelineError::step_runtime("file", format!("writing '{path}': {e}")))
        }
    }
}

#[async_trait]
impl Step for FileStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let action = get_string_or(config, "action", "read");
        let path = get_string_or(config, "path", "");
        let format = get_string_or(config, "format", "auto");

        match action.as_str() {
            "read" => read_file(&path, &format),
            "glob" => glob_files(&path),
            "write" => {
                let data = ctx.data.clone();
                let out_path = if path.is_empty() { "output.json".to_string() } else { path };
                write_file(&out_path, &format, &data)?;
                Ok(data)
            }
            other => Err(PipelineError::Definition(format!("unknown file action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::registry::StepRegistry;
    use std::collections::HashMap;

    fn cfg(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn reads_text_lines() {
        let path = std::env::temp_dir().join(format!("pipeline_file_test_{:?}.txt", std::thread::current().id()));
        std::fs::write(&path, "a\nb\nc\n").unwrap();
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        let config = cfg(vec![("path", Value::String(path.to_string_lossy().to_string())), ("format", Value::String("text".into()))]);
        let out = FileStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 3);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn writes_and_reads_json_round_trip() {
        let path = std::env::temp_dir().join(format!("pipeline_file_test_{:?}.json", std::thread::current().id()));
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("x", Value::Int(1))]));
        let write_config = cfg(vec![("action", Value::String("write".into())), ("path", Value::String(path.to_string_lossy().to_string()))]);
        FileStep.execute(&write_config, &mut ctx).await.unwrap();

        let read_config = cfg(vec![("path", Value::String(path.to_string_lossy().to_string()))]);
        let out = FileStep.execute(&read_config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        let _ = std::fs::remove_file(path);
    }
}
