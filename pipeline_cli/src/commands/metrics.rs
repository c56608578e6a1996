// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `metrics` Command
//!
//! Without `--pipeline`, a dashboard across every pipeline the metrics store
//! has a recorded run for. With `--pipeline`, recent runs plus a per-step
//! bottleneck breakdown for that one pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline_domain::ports::{MetricsStore, RunRecord};
use pipeline_domain::PipelineError;

pub async fn run(pipeline: Option<String>, last: usize, metrics: Arc<dyn MetricsStore>) -> Result<(), PipelineError> {
    match pipeline {
        Some(name) => run_for_pipeline(&name, last, metrics.as_ref()).await,
        None => run_dashboard(metrics.as_ref()).await,
    }
}

async fn run_dashboard(metrics: &dyn MetricsStore) -> Result<(), PipelineError> {
    let names = metrics.pipeline_names().await?;
    if names.is_empty() {
        println!("No runs recorded yet. Run a pipeline first: pipeline-cli run <file>");
        return Ok(());
    }

    println!("{:<24} {:>6} {:>6} {:>6} {:>12} {:>10}", "pipeline", "runs", "ok", "fail", "avg ms", "avg rows");
    for name in names {
        let runs = metrics.recent_runs(&name, 1_000_000).await?;
        let total = runs.len();
        let ok = runs.iter().filter(|r| r.status == "success").count();
        let fail = total - ok;
        let avg_ms = mean(runs.iter().map(|r| r.total_duration_ms));
        let avg_rows = mean(runs.iter().map(|r| r.total_rows as f64));
        println!("{name:<24} {total:>6} {ok:>6} {fail:>6} {avg_ms:>12.1} {avg_rows:>10.1}");
    }
    Ok(())
}

async fn run_for_pipeline(name: &str, last: usize, metrics: &dyn MetricsStore) -> Result<(), PipelineError> {
    let runs = metrics.recent_runs(name, last).await?;
    if runs.is_empty() {
        println!("No runs recorded for '{name}'. Run it first: pipeline-cli run <file>");
        return Ok(());
    }

    println!("Recent runs for {name}:");
    for run in &runs {
        let status = if run.status == "success" { "OK" } else { "FAIL" };
        println!("  {:.0}  {status:<4} {} rows in {:.1}ms", run.started_at, run.total_rows, run.total_duration_ms);
    }

    println!("Bottlenecks:");
    for (step_type, avg_ms, share) in step_breakdown(&runs) {
        println!("  {step_type:<16} avg {avg_ms:.1}ms ({:.0}% of total)", share * 100.0);
    }
    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Average duration and share of total run time per step type, worst
/// offenders first, parsed out of each run's `steps_json` summary.
fn step_breakdown(runs: &[RunRecord]) -> Vec<(String, f64, f64)> {
    let mut totals: HashMap<String, (f64, usize)> = HashMap::new();
    let mut grand_total = 0.0;

    for run in runs {
        let Ok(steps) = serde_json::from_str::<Vec<serde_json::Value>>(&run.steps_json) else { continue };
        for step in steps {
            let step_type = step.get("step_type").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            let duration = step.get("duration_ms").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let entry = totals.entry(step_type).or_insert((0.0, 0));
            entry.0 += duration;
            entry.1 += 1;
            grand_total += duration;
        }
    }

    let mut breakdown: Vec<(String, f64, f64)> = totals
        .into_iter()
        .map(|(step_type, (total_ms, count))| {
            let avg_ms = total_ms / count as f64;
            let share = if grand_total > 0.0 { total_ms / grand_total } else { 0.0 };
            (step_type, avg_ms, share)
        })
        .collect();
    breakdown.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(steps_json: &str) -> RunRecord {
        RunRecord {
            pipeline_name: "t".to_string(),
            pipeline_hash: "h".to_string(),
            started_at: 0.0,
            finished_at: 1.0,
            total_rows: 10,
            total_duration_ms: 100.0,
            status: "success".to_string(),
            error_message: None,
            steps_json: steps_json.to_string(),
            memory_peak_mb: 0.0,
            peak_buffer_rows: 0,
        }
    }

    #[test]
    fn breakdown_ranks_worst_offender_first() {
        let runs = vec![record(r#"[{"step_type":"fetch","duration_ms":80.0},{"step_type":"transform","duration_ms":20.0}]"#)];
        let breakdown = step_breakdown(&runs);
        assert_eq!(breakdown[0].0, "fetch");
        assert!(breakdown[0].2 > breakdown[1].2);
    }

    #[test]
    fn mean_of_empty_iterator_is_zero() {
        assert_eq!(mean(std::iter::empty()), 0.0);
    }
}
