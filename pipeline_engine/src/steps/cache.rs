// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `cache` Step
//!
//! TTL-keyed file cache of a whole dataset, keyed by a SHA-256-truncated
//! hash of the (variable-expanded) cache key. Prevents re-running upstream
//! (typically `fetch`) work across runs during iteration.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use indexmap::IndexMap;
use pipeline_domain::step::{Step, StepMeta, Strategy, StreamingCapability};
use pipeline_domain::{Context, Dataset, PipelineError, Value};
use sha2::{Digest, Sha256};

use super::support::{get_string_or, get_usize_or};

pub fn meta() -> StepMeta {
    StepMeta {
        default_strategy: Strategy::Sync,
        strategy_escalations: Vec::new(),
        streaming_breakers: Vec::new(),
        streaming: StreamingCapability::None,
        fusable: false,
        is_source: false,
        description: "TTL file cache of a dataset, keyed by cache key",
        config_docs: vec![
            ("key", "string — cache key (supports {var}/$VAR expansion via the pipeline's own substitution pass)"),
            ("ttl", "int — time-to-live in seconds (default 3600)"),
            ("action", "string — auto | read | write | clear (default auto)"),
            ("dir", "string — cache directory (default .pipeline_cache)"),
        ],
        required_config: Vec::new(),
    }
}

pub struct CacheStep;

fn cache_path(dir: &str, key: &str) -> std::path::PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    std::path::Path::new(dir).join(format!("{}.json", &hex[..16]))
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn read_cache(dir: &str, key: &str, ttl: u64) -> Option<Dataset> {
    let path = cache_path(dir, key);
    let metadata = std::fs::metadata(&path).ok()?;
    let modified = metadata.modified().ok()?;
    let age = now_secs().saturating_sub(modified.duration_since(UNIX_EPOCH).ok()?.as_secs());
    if age > ttl {
        let _ = std::fs::remove_file(&path);
        return None;
    }
    let text = std::fs::read_to_string(&path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    match value {
        serde_json::Value::Array(items) => Some(Dataset::from_rows(items.into_iter().map(crate::uri::json_to_row).collect())),
        other => Some(Dataset::from_rows(vec![crate::uri::json_to_row(other)])),
    }
}

fn write_cache(dir: &str, key: &str, data: &Dataset) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let rows: Vec<serde_json::Value> = data.rows().iter().map(crate::uri::row_to_json).collect();
    let text = serde_json::to_string(&rows)?;
    std::fs::write(cache_path(dir, key), text)
}

fn clear_cache(dir: &str) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[async_trait]
impl Step for CacheStep {
    async fn execute(&self, config: &IndexMap<String, Value>, ctx: &mut Context) -> Result<Dataset, PipelineError> {
        let ttl = get_usize_or(config, "ttl", 3600) as u64;
        let dir = get_string_or(config, "dir", ".pipeline_cache");
        let action = get_string_or(config, "action", "auto");
        let key = expand_key(&get_string_or(config, "key", "_default"), ctx);

        match action.as_str() {
            "clear" => {
                clear_cache(&dir);
                ctx.vars.insert("_cache_hit".to_string(), Value::Bool(false));
                Ok(ctx.data.clone())
            }
            "write" => {
                write_cache(&dir, &key, &ctx.data)
                    .map_err(|e| PipelineError::step_runtime("cache", format!("writing cache: {e}")))?;
                ctx.vars.insert("_cache_hit".to_string(), Value::Bool(false));
                Ok(ctx.data.clone())
            }
            "read" => match read_cache(&dir, &key, ttl) {
                Some(cached) => {
                    ctx.vars.insert("_cache_hit".to_string(), Value::Bool(true));
                    Ok(cached)
                }
                None => {
                    ctx.vars.insert("_cache_hit".to_string(), Value::Bool(false));
                    Ok(Dataset::new())
                }
            },
            _ => match read_cache(&dir, &key, ttl) {
                Some(cached) => {
                    ctx.vars.insert("_cache_hit".to_string(), Value::Bool(true));
                    Ok(cached)
                }
                None => {
                    ctx.vars.insert("_cache_hit".to_string(), Value::Bool(false));
                    if !ctx.data.is_empty() {
                        let _ = write_cache(&dir, &key, &ctx.data);
                    }
                    Ok(ctx.data.clone())
                }
            },
        }
    }
}

fn expand_key(raw: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            match ctx.vars.get(&name) {
                Some(v) => out.push_str(&v.to_display_string()),
                None => {
                    out.push('{');
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::registry::StepRegistry;
    use pipeline_domain::Row;
    use std::collections::HashMap;

    fn cfg(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("pipeline_cache_test_{:?}", std::thread::current().id()));
        let dir_str = dir.to_string_lossy().to_string();

        let mut ctx = Context::new("t", HashMap::new(), StepRegistry::new());
        ctx.set_data(Dataset::from_rows(vec![Row::new().with("x", Value::Int(1))]));
        let write_config = cfg(vec![
            ("action", Value::String("write".into())),
            ("key", Value::String("k1".into())),
            ("dir", Value::String(dir_str.clone())),
        ]);
        CacheStep.execute(&write_config, &mut ctx).await.unwrap();

        ctx.set_data(Dataset::new());
        let read_config = cfg(vec![
            ("action", Value::String("read".into())),
            ("key", Value::String("k1".into())),
            ("dir", Value::String(dir_str.clone())),
        ]);
        let out = CacheStep.execute(&read_config, &mut ctx).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ctx.vars.get("_cache_hit"), Some(&Value::Bool(true)));

        let _ = std::fs::remove_dir_all(dir);
    }
}
