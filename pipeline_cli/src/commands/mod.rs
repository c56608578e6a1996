// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Handlers
//!
//! One module per `pipeline-cli` subcommand. Each prints its own output and
//! returns a [`pipeline_domain::PipelineError`] on failure; `main` collapses
//! the result to the binding 0/1 process exit status.

pub mod board;
pub mod init;
pub mod lint;
pub mod metrics;
pub mod queue;
pub mod run;
pub mod validate;
pub mod work;
