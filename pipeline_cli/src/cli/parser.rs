// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Surface
//!
//! `clap`-derived command structure: `run`, `validate`, `init`, `metrics`,
//! `board`, `lint`, `queue`, `work`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pipeline-cli", version, about = "Run and manage declarative data-automation pipelines")]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline.
    Run {
        file: PathBuf,

        /// Override or add a pipeline variable, `key=value`; repeatable.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,

        /// Parse and validate only; print a summary and exit without running.
        #[arg(long)]
        dry_run: bool,

        /// Resume from a saved checkpoint instead of running fresh.
        #[arg(long)]
        resume: bool,
    },

    /// Parse and validate a pipeline file without running it.
    Validate { file: PathBuf },

    /// Write a starter pipeline file.
    Init {
        #[arg(long)]
        name: Option<String>,
    },

    /// Show recorded run metrics.
    Metrics {
        /// Show the bottleneck breakdown for one pipeline instead of the cross-pipeline dashboard.
        #[arg(long)]
        pipeline: Option<String>,

        /// Number of recent runs to show when `--pipeline` is given.
        #[arg(long, default_value_t = 10)]
        last: usize,
    },

    /// Show the Kanban board.
    Board,

    /// Statically check a pipeline file for common mistakes.
    Lint { file: PathBuf },

    /// Add a pipeline to the Kanban backlog.
    Queue {
        file: PathBuf,

        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Pull and run queued pipelines until the backlog is empty.
    Work {
        /// Maximum number of items to process; 0 means unlimited.
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if k.is_empty() {
        return Err(format!("expected key=value, got '{s}'"));
    }
    Ok((k.to_string(), v.to_string()))
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_val_pairs() {
        assert_eq!(parse_key_val("a=1").unwrap(), ("a".to_string(), "1".to_string()));
        assert_eq!(parse_key_val("url=http://x?y=1").unwrap(), ("url".to_string(), "http://x?y=1".to_string()));
    }

    #[test]
    fn rejects_missing_equals_or_empty_key() {
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn run_command_parses_repeated_vars_and_flags() {
        let cli = Cli::parse_from(["pipeline-cli", "run", "p.yaml", "--var", "a=1", "--var", "b=2", "--dry-run"]);
        match cli.command {
            Commands::Run { file, vars, dry_run, resume } => {
                assert_eq!(file, PathBuf::from("p.yaml"));
                assert_eq!(vars, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
                assert!(dry_run);
                assert!(!resume);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn work_command_defaults_limit_to_unlimited() {
        let cli = Cli::parse_from(["pipeline-cli", "work"]);
        match cli.command {
            Commands::Work { limit } => assert_eq!(limit, 0),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
