// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Pipeline CLI
//!
//! The command-line front end for the adaptive data pipeline engine. Sits
//! **outside** `pipeline-domain`/`pipeline-engine` and provides:
//!
//! - **Entry point** - application lifecycle management (`main.rs`)
//! - **Platform abstraction** - OS-specific operations (POSIX vs Windows)
//! - **Signal handling** - graceful shutdown (SIGTERM, SIGINT, SIGHUP)
//! - **Argument parsing** - secure CLI argument validation
//! - **Pipeline YAML parsing** - `--var` merging, env/var expansion
//! - **Static linting** - the `lint` command's mistake-proofing checks
//! - **Command handlers** - one module per subcommand
//! - **Error handling** - exit code mapping
//! - **Async coordination** - shutdown coordination and cancellation
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          PIPELINE-CLI (this crate)          │
//! │  - Entry Point / command handlers           │
//! │  - Platform Abstraction                     │
//! │  - Signal Handling                          │
//! │  - Secure Arg Parsing                       │
//! │  - YAML parsing / linting                   │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │              PIPELINE-ENGINE                │
//! │  - Planner, DAG executor, stores            │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │              PIPELINE-DOMAIN                │
//! │  - Types, traits, registry, ports           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **Separation from the engine**
//!    - This crate depends on `pipeline-domain`/`pipeline-engine`
//!    - Neither of those depends back on this crate
//!    - Clear architectural boundary
//!
//! 2. **Platform Abstraction**
//!    - Abstract OS-specific functionality behind traits
//!    - POSIX implementation for Linux/macOS
//!    - Windows implementation with cross-platform stubs
//!    - Compile-time platform selection
//!
//! 3. **Graceful Shutdown**
//!    - Signal handlers (SIGTERM, SIGINT, SIGHUP)
//!    - Cancellation token propagation
//!    - Grace period with timeout enforcement
//!    - Coordinated shutdown across `run`/`work`
//!
//! 4. **Security First**
//!    - Input validation for path/identifier arguments
//!    - Path traversal prevention
//!    - Injection attack protection
//!    - Deliberately not applied to `--var` values or YAML content
//!
//! 5. **Testability**
//!    - All components behind traits
//!    - No-op implementations for testing
//!    - Dependency injection for mocking
//!
//! ## Usage Example
//!
//! ```rust
//! use pipeline_cli::platform::create_platform;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = create_platform();
//!     println!("Running on: {}", platform.platform_name());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - `platform` - OS abstraction (Unix/Windows)
//! - `signals` - Signal handling (SIGTERM, SIGINT, SIGHUP)
//! - `cli` - Secure argument parsing (`parser` + `validator` submodules)
//! - `config` - Application configuration
//! - `exit_code` - Exit code enumeration
//! - `logger` - CLI-layer logging
//! - `shutdown` - Shutdown coordination
//! - `yaml` - Pipeline YAML parsing, `--var` merge, expansion
//! - `linter` - Static pipeline linter (`lint` command)
//! - `commands` - One handler module per subcommand

pub mod cli;
pub mod commands;
pub mod config;
pub mod exit_code;
pub mod linter;
pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;
pub mod yaml;

// Re-export commonly used types
pub use cli::{parse_and_validate, ValidatedCli, ValidatedCommand};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};

/// Bootstrap and parse CLI arguments
///
/// This is the main entry point for the bootstrap layer. It handles:
/// 1. CLI parsing with clap
/// 2. Security validation
/// 3. Returns validated configuration
///
/// The caller is responsible for:
/// - Running the application logic
/// - Mapping results to exit codes using `result_to_exit_code`
///
/// # Returns
///
/// `ValidatedCli` with all arguments security-checked and validated
///
/// # Errors
///
/// Returns `cli::ParseError` if CLI parsing or validation fails.
/// Clap will handle --help and --version automatically and exit the process.
///
/// # Example
///
/// ```no_run
/// use pipeline_cli::{bootstrap_cli, result_to_exit_code};
///
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     let validated_cli = match bootstrap_cli() {
///         Ok(cli) => cli,
///         Err(e) => {
///             eprintln!("CLI Error: {}", e);
///             return std::process::ExitCode::from(1);
///         }
///     };
///
///     let result = run_application(validated_cli).await;
///     result_to_exit_code(result)
/// }
///
/// async fn run_application(cli: pipeline_cli::ValidatedCli) -> Result<(), pipeline_domain::PipelineError> {
///     let _ = cli;
///     Ok(())
/// }
/// ```
pub fn bootstrap_cli() -> Result<ValidatedCli, cli::ParseError> {
    cli::parse_and_validate()
}
