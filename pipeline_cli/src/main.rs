// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `pipeline-cli` Entry Point
//!
//! Composition root: parses and validates argv, wires up `tracing`, builds
//! the step registry and the three persistence stores, hooks the platform
//! signal handler into a [`ShutdownCoordinator`] for `run`/`work`, dispatches
//! to the matching command handler, and collapses the result to the binding
//! 0/1 process exit status.

use std::sync::Arc;
use std::time::Duration;

use pipeline_cli::shutdown::ShutdownCoordinator;
use pipeline_cli::signals::create_signal_handler;
use pipeline_cli::{commands, ExitCode, ValidatedCommand};
use pipeline_domain::ports::{CheckpointStore, KanbanStore, MetricsStore};
use pipeline_domain::PipelineError;
use pipeline_engine::change_detector::HashStore;
use pipeline_engine::stores::{FileCheckpointStore, JsonKanbanStore, SqliteMetricsStore};

const STATE_DIR: &str = ".pipeline-cli";

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init();
}

async fn open_metrics() -> Result<Arc<dyn MetricsStore>, PipelineError> {
    let path = format!("{STATE_DIR}/metrics.db");
    Ok(Arc::new(SqliteMetricsStore::open(&path).await?))
}

fn open_kanban() -> Arc<dyn KanbanStore> {
    Arc::new(JsonKanbanStore::new(format!("{STATE_DIR}/kanban.json")))
}

fn open_checkpoint() -> Arc<dyn CheckpointStore> {
    Arc::new(FileCheckpointStore::new(format!("{STATE_DIR}/checkpoints")))
}

fn open_hash_store() -> Arc<HashStore> {
    Arc::new(HashStore::new(format!("{STATE_DIR}/hashes.json")))
}

/// Spawns the platform signal handler, wiring a received signal into
/// `coordinator.initiate_shutdown()`. Only relevant to `run`/`work`, which
/// check the resulting cancellation token at their own suspension points.
fn spawn_signal_watch(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        let handler = create_signal_handler();
        handler
            .wait_for_signal(Box::new(move || {
                coordinator.initiate_shutdown();
            }))
            .await;
    });
}

async fn dispatch(command: ValidatedCommand, verbose: bool) -> Result<std::process::ExitCode, PipelineError> {
    let registry = pipeline_engine::steps::discover();

    match command {
        ValidatedCommand::Run { file, vars, dry_run, resume } => {
            let metrics = if dry_run { None } else { Some(open_metrics().await?) };
            let checkpoint = if dry_run { None } else { Some(open_checkpoint()) };
            let hash_store = if dry_run { None } else { Some(open_hash_store()) };

            let result = commands::run::run(&file, &vars, dry_run, resume, verbose, &registry, metrics, checkpoint, hash_store).await;
            Ok(std_exit_from(result))
        }
        ValidatedCommand::Validate { file } => Ok(std_exit_from(commands::validate::run(&file))),
        ValidatedCommand::Init { name } => Ok(std_exit_from(commands::init::run(name))),
        ValidatedCommand::Metrics { pipeline, last } => {
            let metrics = open_metrics().await?;
            Ok(std_exit_from(commands::metrics::run(pipeline, last, metrics).await))
        }
        ValidatedCommand::Board => {
            let kanban = open_kanban();
            Ok(std_exit_from(commands::board::run(kanban).await))
        }
        ValidatedCommand::Lint { file } => match commands::lint::run(&file, &registry) {
            Ok(has_errors) => Ok(std::process::ExitCode::from(if has_errors { 1 } else { 0 })),
            Err(e) => Ok(std_exit_from(Err(e))),
        },
        ValidatedCommand::Queue { file, vars } => {
            let kanban = open_kanban();
            Ok(std_exit_from(commands::queue::run(&file, &vars, kanban).await))
        }
        ValidatedCommand::Work { limit } => {
            let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
            spawn_signal_watch(coordinator.clone());

            let metrics = open_metrics().await?;
            let kanban = open_kanban();
            let checkpoint = open_checkpoint();
            let hash_store = open_hash_store();

            Ok(std_exit_from(commands::work::run(limit, &registry, kanban, Some(metrics), Some(checkpoint), Some(hash_store), coordinator.token()).await))
        }
    }
}

fn std_exit_from<T>(result: Result<T, PipelineError>) -> std::process::ExitCode {
    match result {
        Ok(_) => std::process::ExitCode::from(0),
        Err(e) => {
            let diagnostic = ExitCode::from_error(&e);
            tracing::error!(exit_code = %diagnostic, "command failed: {e}");
            std::process::ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let validated = match pipeline_cli::bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e}");
            return std::process::ExitCode::from(1);
        }
    };

    init_tracing(validated.verbose);

    match dispatch(validated.command, validated.verbose).await {
        Ok(code) => code,
        Err(e) => std_exit_from(Err::<(), _>(e)),
    }
}
