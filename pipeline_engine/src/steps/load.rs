// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `load` Step
//!
//! Writes the current dataset to SQLite, CSV, JSON, or `stdout` (the
//! default, a formatted preview). SQLite targets run under WAL with
//! batched `executemany`-equivalent inserts and `insert`/`upsert`/`replace`
//! modes; streaming mode inserts in batches as rows arrive via
//! [`crate::streaming::BatchBuffer`].

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Row, Value};

use super::support::{get_string_or, get_usize_or};
use crate::streaming::BatchBuffer;

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Async,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::Conditional,
        fusable: false,
        is_source: false,
        description: "Write dataset to SQLite, CSV, JSON, or stdout",
        config_docs: vec![
            ("target", "string — URI: sqlite:///, csv://, json://, or stdout (default stdout)"),
            ("table", "string — SQLite table name (default data)"),
            ("mode", "string — insert | upsert | replace (default insert)"),
            ("key", "string — primary key column, required for upsert"),
            ("batch_size", "int — rows per batched insert (default 1000)"),
            ("preview", "int — rows shown for the stdout sink (default 20)"),
        ],
        required_config: vec!["target"],
    }
}

pub struct LoadStep;

fn columns_of(data: &Dataset) -> Vec<String> {
    data.rows().first().map(|r| r.field_names()).unwrap_or_default()
}

fn build_insert_sql(table: &str, columns: &[String], mode: &str, key: Option<&str>) -> String {
    let col_list = columns.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    match (mode, key) {
        ("upsert", Some(key)) => {
            let update_cols = columns
                .iter()
                .filter(|c| c.as_str() != key)
                .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO \"{table}\" ({col_list}) VALUES ({placeholders}) ON CONFLICT(\"{key}\") DO UPDATE SET {update_cols}"
            )
        }
        ("replace", _) => format!("INSERT OR REPLACE INTO \"{table}\" ({col_list}) VALUES ({placeholders})"),
        _ => format!("INSERT INTO \"{table}\" ({col_list}) VALUES ({placeholders})"),
    }
}

async fn ensure_table(pool: &sqlx::SqlitePool, table: &str, columns: &[String], key: Option<&str>) -> Result<(), PipelineError> {
    let col_defs = columns
        .iter()
        .map(|c| {
            if Some(c.as_str()) == key {
                format!("\"{c}\" TEXT PRIMARY KEY")
            } else {
                format!("\"{c}\" TEXT")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!("CREATE TABLE IF NOT EXISTS \"{table}\" ({col_defs})"))
        .execute(pool)
        .await
        .map_err(|e| PipelineError::step_runtime("load", format!("creating table '{table}': {e}")))?;
    Ok(())
}

async fn insert_batch(pool: &sqlx::SqlitePool, sql: &str, columns: &[String], batch: &[Row]) -> Result<(), PipelineError> {
    for row in batch {
        let mut query = sqlx::query(sql);
        for c in columns {
            let value = row.get(c);
            query = match value {
                Value::Null => query.bind(None::<String>),
                other => query.bind(other.to_display_string()),
            };
        }
        query
            .execute(pool)
            .await
            .map_err(|e| PipelineError::step_runtime("load", format!("inserting row: {e}")))?;
    }
    Ok(())
}

async fn open_sqlite(path: &str) -> Result<sqlx::SqlitePool, PipelineError> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::step_runtime("load", format!("creating directory: {e}")))?;
        }
    }
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options)
        .await
        .map_err(|e| PipelineError::step_runtime("load", format!("opening sqlite '{path}': {e}")))?;
    for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-8000", "PRAGMA temp_store=MEMORY"] {
        sqlx::query(pragma).execute(&pool).await.map_err(|e| PipelineError::step_runtime("load", format!("setting pragma: {e}")))?;
    }
    Ok(pool)
}

async fn load_sqlite(path: &str, table: &str, mode: &str, key: Option<&str>, batch_size: usize, data: &Dataset) -> Result<(), PipelineError> {
    if data.is_empty() {
        return Ok(());
    }
    let columns = columns_of(data);
    let pool = open_sqlite(path).await?;
    ensure_table(&pool, table, &columns, key).await?;
    let sql = build_insert_sql(table, &columns, mode, key);
    for chunk in data.rows().chunks(batch_size.max(1)) {
        insert_batch(&pool, &sql, &columns, chunk).await?;
    }
    pool.close().await;
    Ok(())
}

fn load_csv(path: &str, data: &Dataset, append: bool) -> Result<(), PipelineError> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::step_runtime("load", format!("creating directory: {e}")))?;
        }
    }
    let columns = columns_of(data);
    let write_header = !append || !std::path::Path::new(path).exists() || std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| PipelineError::step_runtime("load", format!("opening '{path}': {e}")))?;
    let mut writer = csv::Writer::from_writer(file);
    if write_header {
        writer.write_record(&columns).map_err(|e| PipelineError::step_runtime("load", format!("writing header: {e}")))?;
    }
    for row in data.rows() {
        let record: Vec<String> = columns.iter().map(|c| row.get(c).to_display_string()).collect();
        writer.write_record(&record).map_err(|e| PipelineError::step_runtime("load", format!("writing row: {e}")))?;
    }
    writer.flush().map_err(|e| PipelineError::step_runtime("load", format!("flushing '{path}': {e}")))?;
    Ok(())
}

fn load_json(path: &str, data: &Dataset) -> Result<(), PipelineError> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::step_runtime("load", format!("creating directory: {e}")))?;
        }
    }
    let rows: Vec<serde_json::Value> = data.rows().iter().map(crate::uri::row_to_json).collect();
    let text = serde_json::to_string_pretty(&rows).map_err(|e| PipelineError::step_runtime("load", format!("serializing: {e}")))?;
    std::fs::write(path, text).map_err(|e| PipelineError::step_runtime("load", format!("writing '{path}': {e}")))
}

fn load_stdout(data: &Dataset, preview: usize) {
    let shown = &data.rows()[..data.len().min(preview)];
    if shown.is_empty() {
        println!("  (no data)");
        return;
    }
    let columns = columns_of(data);
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in shown {
        for (i, c) in columns.iter().enumerate() {
            let len = row.get(c).to_display_string().len();
            widths[i] = widths[i].max(len).min(40);
        }
    }
    let header = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<width$.width$}", c, width = *w))
        .collect::<Vec<_>>()
        .join(" | ");
    println!("  {header}");
    println!("  {}", "-".repeat(header.len()));
    for row in shown {
        let line = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$.width$}", row.get(c).to_display_string(), width = *w))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("  {line}");
    }
    if data.len() > preview {
        println!("  ... and {} more rows", data.len() - preview);
    }
}

#[async_trait]
impl Step for LoadStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let target = get_string_or(config, "target", "stdout");
        let data = ctx.data.clone();
        if data.is_empty() {
            return Ok(data);
        }

        let table = get_string_or(config, "table", "data");
        let mode = get_string_or(config, "mode", "insert");
        let key = config.get("key").and_then(Value::as_str);
        let batch_size = get_usize_or(config, "batch_size", 1000);
        let preview = get_usize_or(config, "preview", 20);

        if let Some(path) = target.strip_prefix("sqlite:///").or_else(|| target.strip_prefix("sqlite://")) {
            load_sqlite(path, &table, &mode, key, batch_size, &data).await?;
        } else if target.starts_with("csv://") || target.ends_with(".csv") {
            let path = target.strip_prefix("csv://").unwrap_or(&target);
            load_csv(path, &data, mode == "append")?;
        } else if target.starts_with("json://") || target.ends_with(".json") {
            let path = target.strip_prefix("json://").unwrap_or(&target);
            load_json(path, &data)?;
        } else {
            load_stdout(&data, preview);
        }

        Ok(data)
    }

    async fn execute_stream<'a>(
        &'a self,
        config: &'a IndexMap<String, Value>,
        ctx: &'a mut Context,
    ) -> Result<BoxStream<'a, Row>, PipelineError> {
        let target = get_string_or(config, "target", "stdout");
        let data = ctx.data.clone();

        if let Some(path) = target.strip_prefix("sqlite:///").or_else(|| target.strip_prefix("sqlite://")) {
            if !data.is_empty() {
                let table = get_string_or(config, "table", "data");
                let mode = get_string_or(config, "mode", "insert");
                let key = config.get("key").and_then(Value::as_str).map(str::to_string);
                let batch_size = get_usize_or(config, "batch_size", 1000);
                let columns = columns_of(&data);
                let pool = open_sqlite(path).await?;
                ensure_table(&pool, &table, &columns, key.as_deref()).await?;
                let sql = build_insert_sql(&table, &columns, &mode, key.as_deref());
                let mut buffer = BatchBuffer::new(batch_size);
                for row in data.rows() {
                    buffer.add(row.clone());
                    if buffer.is_full() {
                        insert_batch(&pool, &sql, &columns, &buffer.flush()).await?;
                    }
                }
                if buffer.count() > 0 {
                    insert_batch(&pool, &sql, &columns, &buffer.flush()).await?;
                }
                pool.close().await;
            }
        } else {
            self.execute(config, ctx).await?;
        }

        Ok(Box::pin(stream::iter(data.into_rows())))
    }

    fn supports_streaming(&self) -> bool {
        true
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
    async fn writes_csv_and_preserves_data() {
        let path = std::env::temp_dir().join(format!("pipeline_load_test_{:?}.csv", std::thread::current().id()));
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("id", Value::Int(1)).with("name", Value::String("a".into()))]));
        let config = cfg(vec![("target", Value::String(path.to_string_lossy().to_string()))]);
        let out = LoadStep.execute(&config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn empty_data_is_a_noop() {
        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        let config = cfg(vec![("target", Value::String("stdout".into()))]);
        let out = LoadStep.execute(&config, &mut ctx).await.unwrap();
        assert!(out.is_empty());
    }
}
