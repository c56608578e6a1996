// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `shell` Step
//!
//! Runs a shell command with a timeout, capturing its output as `lines`
//! (default), `json`, or `raw`. A source step — it ignores the incoming
//! dataset entirely.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::support::{get_str, get_string_or, get_usize_or};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Async,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: true,
        description: "Execute shell commands",
        config_docs: vec![
            ("command", "string — shell command to execute"),
            ("timeout", "int — timeout in seconds (default 60)"),
            ("capture", "string — output mode: lines | raw | json (default lines)"),
        ],
        required_config: vec!["command"],
    }
}

pub struct ShellStep;

#[async_trait]
impl Step for ShellStep {
    async fn execute(&self, config: &IndexMap<String, Value>, _ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let command = get_str(config, "command").unwrap_or_default().to_string();
        let timeout_secs = get_usize_or(config, "timeout", 60) as u64;
        let capture = get_string_or(config, "capture", "lines");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::step_runtime("shell", format!("spawning '{command}': {e}")))?;

        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");

        let read_and_wait = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let _ = stdout_pipe.read_to_string(&mut stdout).await;
            let _ = stderr_pipe.read_to_string(&mut stderr).await;
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let (stdout, stderr, status) = match tokio::time::timeout(Duration::from_secs(timeout_secs), read_and_wait).await {
            Ok(result) => result,
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Ok(Dataset::from_rows(vec![Row::new()
                    .with("_error", Value::String(format!("command timed out after {timeout_secs}s")))
                    .with("_command", Value::String(command))]));
            }
        };

        let returncode = status.ok().and_then(|s| s.code()).unwrap_or(-1);

        let rows = match capture.as_str() {
            "lines" => stdout
                .trim()
                .lines()
                .filter(|l| !l.trim().is_empty())
                .enumerate()
                .map(|(i, line)| Row::new().with("line", Value::String(line.to_string())).with("_index", Value::Int(i as i64)))
                .collect(),
            "json" => match serde_json::from_str::<serde_json::Value>(&stdout) {
                Ok(serde_json::Value::Array(items)) => items.into_iter().map(crate::uri::json_to_row).collect(),
                Ok(other) => vec![crate::uri::json_to_row(other)],
                Err(_) => vec![Row::new()
                    .with("_raw", Value::String(stdout.clone()))
                    .with("_error", Value::String("not valid json".to_string()))],
            },
            _ => vec![Row::new()
                .with("_stdout", Value::String(stdout))
                .with("_stderr", Value::String(stderr))
                .with("_returncode", Value::Int(returncode as i64))
                .with("_command", Value::String(command))],
        };

        Ok(Dataset::from_rows(rows))
    }
}
