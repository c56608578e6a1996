// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! ```text
//! 1. parser::parse_cli()           parse argv with clap
//! 2. validate_cli()                security validation, path canonicalization
//! 3. ValidatedCli / ValidatedCommand   safe, ready-to-dispatch configuration
//! ```

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Run { file: PathBuf, vars: Vec<(String, String)>, dry_run: bool, resume: bool },
    Validate { file: PathBuf },
    Init { name: Option<String> },
    Metrics { pipeline: Option<String>, last: usize },
    Board,
    Lint { file: PathBuf },
    Queue { file: PathBuf, vars: Vec<(String, String)> },
    Work { limit: usize },
}

/// Parses `argv` with clap, then security-validates every path and
/// identifier argument before returning.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_vars(vars: Vec<(String, String)>) -> Result<Vec<(String, String)>, ParseError> {
    vars.into_iter()
        .map(|(k, v)| {
            SecureArgParser::validate_argument(&k)?;
            SecureArgParser::validate_var_value(&v)?;
            Ok((k, v))
        })
        .collect()
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let command = match cli.command {
        Commands::Run { file, vars, dry_run, resume } => ValidatedCommand::Run {
            file: SecureArgParser::validate_path(&file.to_string_lossy())?,
            vars: validate_vars(vars)?,
            dry_run,
            resume,
        },
        Commands::Validate { file } => {
            ValidatedCommand::Validate { file: SecureArgParser::validate_path(&file.to_string_lossy())? }
        }
        Commands::Init { name } => {
            if let Some(n) = &name {
                SecureArgParser::validate_argument(n)?;
            }
            ValidatedCommand::Init { name }
        }
        Commands::Metrics { pipeline, last } => {
            if let Some(p) = &pipeline {
                SecureArgParser::validate_argument(p)?;
            }
            ValidatedCommand::Metrics { pipeline, last }
        }
        Commands::Board => ValidatedCommand::Board,
        Commands::Lint { file } => {
            ValidatedCommand::Lint { file: SecureArgParser::validate_path(&file.to_string_lossy())? }
        }
        Commands::Queue { file, vars } => ValidatedCommand::Queue {
            file: SecureArgParser::validate_path(&file.to_string_lossy())?,
            vars: validate_vars(vars)?,
        },
        Commands::Work { limit } => ValidatedCommand::Work { limit },
    };

    Ok(ValidatedCli { command, verbose: cli.verbose })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_var_keys_but_allows_arbitrary_values() {
        let vars = vec![("safe".to_string(), "$HOME/data;drop".to_string())];
        assert!(validate_vars(vars).is_ok());

        let vars = vec![("bad;key".to_string(), "value".to_string())];
        assert!(validate_vars(vars).is_err());
    }
}
