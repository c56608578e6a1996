// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Secure Command-Line Argument Parsing
//!
//! Security-first validation for path-like and identifier-like CLI
//! arguments (the pipeline file, `init --name`, `lint`/`queue`'s file
//! argument). Deliberately **not** applied to `--var K=V` values — those
//! carry arbitrary pipeline data the process never shell-interprets, so a
//! value containing `$`, `;`, or `>` is legitimate pipeline input, not an
//! attack; [`validate_var_value`] applies only a length/control-character
//! check to that surface.

use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_ARG_COUNT: usize = 100;
const MAX_ARG_LENGTH: usize = 1000;
const MAX_PATH_LENGTH: usize = 4096;

const DANGEROUS_PATTERNS: &[&str] = &[
    "..", "~", "$", "`", ";", "&", "|", ">", "<", "\n", "\r", "\0",
];

const PROTECTED_DIRS: &[&str] = &["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("too many arguments (max {MAX_ARG_COUNT})")]
    TooManyArguments,

    #[error("argument too long (max {MAX_ARG_LENGTH} characters): {0}")]
    ArgumentTooLong(String),

    #[error("dangerous pattern detected in argument: {pattern} in {arg}")]
    DangerousPattern { pattern: String, arg: String },

    #[error("path exceeds maximum length (max {MAX_PATH_LENGTH})")]
    PathTooLong,

    #[error("access to protected system directory denied: {0}")]
    ProtectedDirectory(String),

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid argument value for {arg}: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("{0}")]
    Clap(String),

    #[error("{0}")]
    Yaml(String),
}

pub struct SecureArgParser;

impl SecureArgParser {
    pub fn check_arg_count(count: usize) -> Result<(), ParseError> {
        if count > MAX_ARG_COUNT {
            Err(ParseError::TooManyArguments)
        } else {
            Ok(())
        }
    }

    /// Full validation for path-like/identifier-like arguments: length plus
    /// the dangerous-pattern blocklist.
    pub fn validate_argument(arg: &str) -> Result<(), ParseError> {
        if arg.len() > MAX_ARG_LENGTH {
            return Err(ParseError::ArgumentTooLong(arg.chars().take(50).collect::<String>() + "..."));
        }

        for pattern in DANGEROUS_PATTERNS {
            if arg.contains(pattern) {
                return Err(ParseError::DangerousPattern { pattern: pattern.to_string(), arg: arg.to_string() });
            }
        }

        Ok(())
    }

    /// Lenient validation for `--var` values: arbitrary pipeline data, only
    /// bounded in length and free of control characters that would corrupt
    /// the persisted Kanban/checkpoint JSON.
    pub fn validate_var_value(value: &str) -> Result<(), ParseError> {
        if value.len() > MAX_ARG_LENGTH {
            return Err(ParseError::ArgumentTooLong(value.chars().take(50).collect::<String>() + "..."));
        }
        if value.contains('\0') {
            return Err(ParseError::DangerousPattern { pattern: "\\0".to_string(), arg: value.to_string() });
        }
        Ok(())
    }

    /// Validates, canonicalizes, and existence-checks a path that must
    /// already exist (the pipeline file, `lint`/`queue`'s argument).
    pub fn validate_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path).map_err(|e| match e {
            ParseError::ArgumentTooLong(_) => ParseError::InvalidPath(format!("path too long: {path}")),
            ParseError::DangerousPattern { pattern, .. } => {
                ParseError::InvalidPath(format!("path contains dangerous pattern '{pattern}': {path}"))
            }
            other => other,
        })?;

        let path_obj = Path::new(path);

        let canonical = path_obj.canonicalize().map_err(|_| {
            if !path_obj.exists() {
                ParseError::PathNotFound(path.to_string())
            } else {
                ParseError::InvalidPath(path.to_string())
            }
        })?;

        if canonical.to_string_lossy().len() > MAX_PATH_LENGTH {
            return Err(ParseError::PathTooLong);
        }

        for protected in PROTECTED_DIRS {
            if canonical.starts_with(protected) {
                return Err(ParseError::ProtectedDirectory(canonical.display().to_string()));
            }
        }

        Ok(canonical)
    }

    /// Validates a path argument that names a file which may not exist yet
    /// (e.g. `init`'s output, a `run --dry-run` target directory).
    pub fn validate_new_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path)?;
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod argument_validation {
        use super::*;

        #[test]
        fn accepts_safe_arguments() {
            assert!(SecureArgParser::validate_argument("safe-arg").is_ok());
            assert!(SecureArgParser::validate_argument("file.txt").is_ok());
            assert!(SecureArgParser::validate_argument("path/to/file").is_ok());
        }

        #[test]
        fn rejects_too_long_arguments() {
            let long_arg = "a".repeat(MAX_ARG_LENGTH + 1);
            assert!(matches!(SecureArgParser::validate_argument(&long_arg), Err(ParseError::ArgumentTooLong(_))));
        }

        #[test]
        fn detects_dangerous_patterns() {
            let dangerous = vec![
                "../etc/passwd",
                "~/.ssh/id_rsa",
                "$(whoami)",
                "`ls`",
                "file;rm -rf /",
                "file&background",
                "file|pipe",
                "file>output",
                "file<input",
                "file\nwith\nnewlines",
            ];

            for arg in dangerous {
                assert!(
                    matches!(SecureArgParser::validate_argument(arg), Err(ParseError::DangerousPattern { .. })),
                    "failed to detect dangerous pattern in: {arg}"
                );
            }
        }
    }

    mod var_value_validation {
        use super::*;

        #[test]
        fn allows_characters_forbidden_in_path_arguments() {
            assert!(SecureArgParser::validate_var_value("https://example.com/$x;y|z").is_ok());
            assert!(SecureArgParser::validate_var_value("../relative/but/fine/as/data").is_ok());
        }

        #[test]
        fn still_rejects_null_bytes_and_oversize() {
            assert!(SecureArgParser::validate_var_value("a\0b").is_err());
            let long = "a".repeat(MAX_ARG_LENGTH + 1);
            assert!(SecureArgParser::validate_var_value(&long).is_err());
        }
    }

    mod path_validation {
        use super::*;

        #[test]
        fn missing_path_reports_not_found() {
            let result = SecureArgParser::validate_path("/this/path/does/not/exist/pipeline.yaml");
            assert!(matches!(result, Err(ParseError::PathNotFound(_))));
        }

        #[test]
        fn new_path_does_not_require_existence() {
            assert!(SecureArgParser::validate_new_path("not-yet-created.yaml").is_ok());
        }
    }
}
