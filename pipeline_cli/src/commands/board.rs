// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `board` Command
//!
//! Prints the Kanban board, one column per state.

use std::sync::Arc;

use pipeline_domain::ports::{KanbanItem, KanbanStore};
use pipeline_domain::PipelineError;

const COLUMNS: [&str; 4] = ["backlog", "in_progress", "done", "failed"];
const NAME_WIDTH: usize = 20;

pub async fn run(kanban: Arc<dyn KanbanStore>) -> Result<(), PipelineError> {
    let board = kanban.board().await?;
    let total: usize = board.values().map(Vec::len).sum();

    if total == 0 {
        println!("Board is empty. Queue a pipeline first: pipeline-cli queue <file>");
        return Ok(());
    }

    println!("{:<22}{:<22}{:<22}{:<22}", "BACKLOG", "IN_PROGRESS", "DONE", "FAILED");
    let empty: Vec<KanbanItem> = Vec::new();
    let columns: Vec<&Vec<KanbanItem>> = COLUMNS.iter().map(|c| board.get(*c).unwrap_or(&empty)).collect();
    let rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);

    for row in 0..rows {
        let mut line = String::new();
        for column in &columns {
            let cell = column.get(row).map(|item| truncate(&item.pipeline_name, NAME_WIDTH)).unwrap_or_default();
            line.push_str(&format!("{cell:<22}"));
        }
        println!("{line}");
    }

    println!("Total: {total} items");
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut clipped: String = s.chars().take(width.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_names_untouched() {
        assert_eq!(truncate("short", 20), "short");
    }

    #[test]
    fn truncate_clips_long_names_with_ellipsis() {
        let long = "a".repeat(30);
        let result = truncate(&long, 20);
        assert_eq!(result.chars().count(), 20);
        assert!(result.ends_with('…'));
    }
}
