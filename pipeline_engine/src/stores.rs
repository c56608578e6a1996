// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Adapters
//!
//! Concrete implementations of the domain's repository ports:
//! [`SqliteMetricsStore`] (a single `pipeline_runs` table), [`JsonKanbanStore`]
//! (one JSON document of items), and [`FileCheckpointStore`] (a per-pipeline
//! directory of `checkpoint.json` + `data.json`). All three are best-effort
//! from the driver's point of view — persistence failures here never abort a
//! run, per the error-handling design.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_domain::ports::{CheckpointState, CheckpointStore, KanbanItem, KanbanState, KanbanStore, MetricsStore, RunRecord};
use pipeline_domain::{Dataset, PipelineError, Value};

fn now_secs() -> f64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

// --- Metrics ----------------------------------------------------------------

/// SQLite-backed `pipeline_runs` table, one connection pool per pipeline run
/// per the concurrency model's resource policy.
pub struct SqliteMetricsStore {
    pool: sqlx::SqlitePool,
}

impl SqliteMetricsStore {
    pub async fn open(path: &str) -> Result<Self, PipelineError> {
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| PipelineError::Internal(format!("creating metrics directory: {e}")))?;
            }
        }
        let options = sqlx::sqlite::SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options)
            .await
            .map_err(|e| PipelineError::Internal(format!("opening metrics store '{path}': {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pipeline_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pipeline_name TEXT NOT NULL,
                pipeline_hash TEXT NOT NULL,
                started_at REAL NOT NULL,
                finished_at REAL NOT NULL,
                total_rows INTEGER NOT NULL,
                total_duration_ms REAL NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                steps_json TEXT NOT NULL,
                memory_peak_mb REAL NOT NULL,
                peak_buffer_rows INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| PipelineError::Internal(format!("creating pipeline_runs table: {e}")))?;

        for idx_sql in [
            "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_name ON pipeline_runs(pipeline_name)",
            "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_started ON pipeline_runs(started_at)",
        ] {
            sqlx::query(idx_sql).execute(&pool).await.map_err(|e| PipelineError::Internal(format!("creating index: {e}")))?;
        }

        Ok(Self { pool })
    }
}

#[derive(sqlx::FromRow)]
struct RunRecordRow {
    pipeline_name: String,
    pipeline_hash: String,
    started_at: f64,
    finished_at: f64,
    total_rows: i64,
    total_duration_ms: f64,
    status: String,
    error_message: Option<String>,
    steps_json: String,
    memory_peak_mb: f64,
    peak_buffer_rows: i64,
}

impl RunRecordRow {
    fn into_domain(self) -> RunRecord {
        RunRecord {
            pipeline_name: self.pipeline_name,
            pipeline_hash: self.pipeline_hash,
            started_at: self.started_at,
            finished_at: self.finished_at,
            total_rows: self.total_rows as usize,
            total_duration_ms: self.total_duration_ms,
            status: self.status,
            error_message: self.error_message,
            steps_json: self.steps_json,
            memory_peak_mb: self.memory_peak_mb,
            peak_buffer_rows: self.peak_buffer_rows as usize,
        }
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn record_run(&self, record: RunRecord) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO pipeline_runs
                (pipeline_name, pipeline_hash, started_at, finished_at, total_rows, total_duration_ms, status, error_message, steps_json, memory_peak_mb, peak_buffer_rows)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.pipeline_name)
        .bind(record.pipeline_hash)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.total_rows as i64)
        .bind(record.total_duration_ms)
        .bind(record.status)
        .bind(record.error_message)
        .bind(record.steps_json)
        .bind(record.memory_peak_mb)
        .bind(record.peak_buffer_rows as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Internal(format!("recording run: {e}")))?;
        Ok(())
    }

    async fn recent_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>, PipelineError> {
        let rows = sqlx::query_as::<_, RunRecordRow>(
            "SELECT pipeline_name, pipeline_hash, started_at, finished_at, total_rows, total_duration_ms, status, error_message, steps_json, memory_peak_mb, peak_buffer_rows
             FROM pipeline_runs WHERE pipeline_name = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(pipeline_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Internal(format!("querying recent runs: {e}")))?;

        Ok(rows.into_iter().map(RunRecordRow::into_domain).collect())
    }

    async fn mean_row_count(&self, pipeline_name: &str) -> Result<Option<f64>, PipelineError> {
        let row: Option<(Option<f64>,)> = sqlx::query_as("SELECT AVG(total_rows) FROM pipeline_runs WHERE pipeline_name = ? AND status = 'success'")
            .bind(pipeline_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Internal(format!("querying mean row count: {e}")))?;
        Ok(row.and_then(|(v,)| v))
    }

    async fn pipeline_names(&self) -> Result<Vec<String>, PipelineError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT pipeline_name FROM pipeline_runs ORDER BY pipeline_name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Internal(format!("querying pipeline names: {e}")))?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.pool.close().await;
        Ok(())
    }
}

// --- Kanban -------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct KanbanItemDoc {
    id: String,
    pipeline_file: String,
    pipeline_name: String,
    variables: serde_json::Value,
    state: String,
    created_at: f64,
    updated_at: f64,
    error: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct KanbanDoc {
    items: Vec<KanbanItemDoc>,
}

fn kanban_state_to_str(state: KanbanState) -> String {
    state.as_str().to_string()
}

fn kanban_state_from_str(s: &str) -> KanbanState {
    match s {
        "in_progress" => KanbanState::InProgress,
        "done" => KanbanState::Done,
        "failed" => KanbanState::Failed,
        _ => KanbanState::Backlog,
    }
}

fn doc_to_item(doc: &KanbanItemDoc) -> KanbanItem {
    let variables = match &doc.variables {
        serde_json::Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), crate::uri::json_to_value(v.clone()))).collect::<HashMap<String, Value>>(),
        _ => HashMap::new(),
    };
    KanbanItem {
        id: doc.id.clone(),
        pipeline_file: doc.pipeline_file.clone(),
        pipeline_name: doc.pipeline_name.clone(),
        variables,
        state: kanban_state_from_str(&doc.state),
        created_at: doc.created_at,
        updated_at: doc.updated_at,
        error: doc.error.clone(),
        summary: doc.summary.clone(),
    }
}

/// JSON-document-backed Kanban board. Guarded by a mutex since reads and
/// writes both go through a full-document load/save, and concurrent pulls
/// must not race on the same backlog item.
pub struct JsonKanbanStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonKanbanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_doc(&self) -> Result<KanbanDoc, PipelineError> {
        if !self.path.exists() {
            return Ok(KanbanDoc::default());
        }
        let text = std::fs::read_to_string(&self.path).map_err(|e| PipelineError::Internal(format!("reading kanban board: {e}")))?;
        if text.trim().is_empty() {
            return Ok(KanbanDoc::default());
        }
        serde_json::from_str(&text).map_err(|e| PipelineError::Internal(format!("parsing kanban board: {e}")))
    }

    fn write_doc(&self, doc: &KanbanDoc) -> Result<(), PipelineError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| PipelineError::Internal(format!("creating kanban directory: {e}")))?;
            }
        }
        let text = serde_json::to_string_pretty(doc).map_err(|e| PipelineError::Internal(format!("serializing kanban board: {e}")))?;
        std::fs::write(&self.path, text).map_err(|e| PipelineError::Internal(format!("writing kanban board: {e}")))
    }
}

#[async_trait]
impl KanbanStore for JsonKanbanStore {
    async fn add(&self, pipeline_file: &str, pipeline_name: &str, variables: HashMap<String, Value>) -> Result<String, PipelineError> {
        let _guard = self.lock.lock();
        let mut doc = self.read_doc()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_secs();
        let variables_json = serde_json::Value::Object(variables.iter().map(|(k, v)| (k.clone(), crate::uri::value_to_json(v))).collect());
        doc.items.push(KanbanItemDoc {
            id: id.clone(),
            pipeline_file: pipeline_file.to_string(),
            pipeline_name: pipeline_name.to_string(),
            variables: variables_json,
            state: kanban_state_to_str(KanbanState::Backlog),
            created_at: now,
            updated_at: now,
            error: None,
            summary: None,
        });
        self.write_doc(&doc)?;
        Ok(id)
    }

    async fn pull_next(&self) -> Result<Option<KanbanItem>, PipelineError> {
        let _guard = self.lock.lock();
        let mut doc = self.read_doc()?;
        let Some(item) = doc.items.iter_mut().find(|i| i.state == "backlog") else { return Ok(None) };
        item.state = kanban_state_to_str(KanbanState::InProgress);
        item.updated_at = now_secs();
        let result = doc_to_item(item);
        self.write_doc(&doc)?;
        Ok(Some(result))
    }

    async fn update_state(&self, item_id: &str, state: KanbanState, error: Option<String>, summary: Option<String>) -> Result<(), PipelineError> {
        let _guard = self.lock.lock();
        let mut doc = self.read_doc()?;
        let Some(item) = doc.items.iter_mut().find(|i| i.id == item_id) else {
            return Err(PipelineError::Internal(format!("no kanban item '{item_id}'")));
        };
        item.state = kanban_state_to_str(state);
        item.updated_at = now_secs();
        item.error = error;
        item.summary = summary;
        self.write_doc(&doc)
    }

    async fn board(&self) -> Result<HashMap<String, Vec<KanbanItem>>, PipelineError> {
        let doc = self.read_doc()?;
        let mut grouped: HashMap<String, Vec<KanbanItem>> = HashMap::new();
        for item in &doc.items {
            grouped.entry(item.state.clone()).or_default().push(doc_to_item(item));
        }
        Ok(grouped)
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<KanbanItem>, PipelineError> {
        let doc = self.read_doc()?;
        Ok(doc.items.iter().find(|i| i.id == item_id).map(doc_to_item))
    }
}

// --- Checkpoint -----------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CheckpointMeta {
    completed_step: usize,
    timestamp: f64,
    vars: serde_json::Value,
}

/// Per-pipeline directory of `checkpoint.json` (metadata) + `data.json`
/// (dataset snapshot), written atomically via write-to-temp-then-rename.
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_for(&self, pipeline_name: &str) -> PathBuf {
        self.root.join(pipeline_name)
    }

    fn write_atomic(path: &Path, contents: &str) -> Result<(), PipelineError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(|e| PipelineError::Internal(format!("writing checkpoint: {e}")))?;
        std::fs::rename(&tmp, path).map_err(|e| PipelineError::Internal(format!("committing checkpoint: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, pipeline_name: &str, step_index: usize, data: &Dataset, vars: &HashMap<String, Value>) -> Result<(), PipelineError> {
        let dir = self.dir_for(pipeline_name);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::Internal(format!("creating checkpoint directory: {e}")))?;

        let vars_json = serde_json::Value::Object(vars.iter().map(|(k, v)| (k.clone(), crate::uri::value_to_json(v))).collect());
        let meta = CheckpointMeta { completed_step: step_index, timestamp: now_secs(), vars: vars_json };
        let meta_text = serde_json::to_string_pretty(&meta).map_err(|e| PipelineError::Internal(format!("serializing checkpoint metadata: {e}")))?;
        Self::write_atomic(&dir.join("checkpoint.json"), &meta_text)?;

        let data_json: Vec<serde_json::Value> = data.iter().map(crate::uri::row_to_json).collect();
        let data_text =
            serde_json::to_string(&data_json).map_err(|e| PipelineError::Internal(format!("serializing checkpoint data: {e}")))?;
        Self::write_atomic(&dir.join("data.json"), &data_text)?;

        Ok(())
    }

    async fn load(&self, pipeline_name: &str) -> Result<Option<CheckpointState>, PipelineError> {
        let dir = self.dir_for(pipeline_name);
        let meta_path = dir.join("checkpoint.json");
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta_text = std::fs::read_to_string(&meta_path).map_err(|e| PipelineError::Internal(format!("reading checkpoint metadata: {e}")))?;
        let meta: CheckpointMeta = serde_json::from_str(&meta_text).map_err(|e| PipelineError::Internal(format!("parsing checkpoint metadata: {e}")))?;

        let data_text = std::fs::read_to_string(dir.join("data.json")).map_err(|e| PipelineError::Internal(format!("reading checkpoint data: {e}")))?;
        let data_json: Vec<serde_json::Value> = serde_json::from_str(&data_text).map_err(|e| PipelineError::Internal(format!("parsing checkpoint data: {e}")))?;
        let data = Dataset::from_rows(data_json.into_iter().map(|v| match crate::uri::json_to_value(v) {
            Value::Row(r) => r,
            other => pipeline_domain::Row::new().with("value", other),
        }).collect());

        let vars = match meta.vars {
            serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, crate::uri::json_to_value(v))).collect(),
            _ => HashMap::new(),
        };

        Ok(Some(CheckpointState { completed_step: meta.completed_step, timestamp: meta.timestamp, data, vars }))
    }

    async fn clear(&self, pipeline_name: &str) -> Result<(), PipelineError> {
        let dir = self.dir_for(pipeline_name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| PipelineError::Internal(format!("clearing checkpoint: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self, pipeline_name: &str) -> Result<bool, PipelineError> {
        Ok(self.dir_for(pipeline_name).join("checkpoint.json").exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn metrics_store_records_and_averages() {
        let dir = tempdir().unwrap();
        let store = SqliteMetricsStore::open(dir.path().join("metrics.db").to_str().unwrap()).await.unwrap();

        for total_rows in [100, 200] {
            store
                .record_run(RunRecord {
                    pipeline_name: "p".to_string(),
                    pipeline_hash: "h".to_string(),
                    started_at: 0.0,
                    finished_at: 1.0,
                    total_rows,
                    total_duration_ms: 10.0,
                    status: "success".to_string(),
                    error_message: None,
                    steps_json: "[]".to_string(),
                    memory_peak_mb: 1.0,
                    peak_buffer_rows: total_rows,
                })
                .await
                .unwrap();
        }

        let mean = store.mean_row_count("p").await.unwrap();
        assert_eq!(mean, Some(150.0));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn kanban_store_round_trips_through_backlog_and_in_progress() {
        let dir = tempdir().unwrap();
        let store = JsonKanbanStore::new(dir.path().join("board.json"));
        let id = store.add("p.yaml", "p", HashMap::new()).await.unwrap();

        let pulled = store.pull_next().await.unwrap().unwrap();
        assert_eq!(pulled.id, id);
        assert_eq!(pulled.state, KanbanState::InProgress);

        store.update_state(&id, KanbanState::Done, None, Some("12 rows".to_string())).await.unwrap();
        let item = store.get_item(&id).await.unwrap().unwrap();
        assert_eq!(item.state, KanbanState::Done);
        assert_eq!(item.summary.as_deref(), Some("12 rows"));
    }

    #[tokio::test]
    async fn checkpoint_store_saves_and_loads_data() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let data = Dataset::from_rows(vec![pipeline_domain::Row::new().with("a", Value::Int(1))]);
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), Value::Int(5));

        assert!(!store.exists("p").await.unwrap());
        store.save("p", 2, &data, &vars).await.unwrap();
        assert!(store.exists("p").await.unwrap());

        let loaded = store.load("p").await.unwrap().unwrap();
        assert_eq!(loaded.completed_step, 2);
        assert_eq!(loaded.data.len(), 1);
        assert_eq!(loaded.vars.get("x"), Some(&Value::Int(5)));

        store.clear("p").await.unwrap();
        assert!(!store.exists("p").await.unwrap());
    }
}
