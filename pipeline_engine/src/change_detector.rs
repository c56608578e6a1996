// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # JIT Change Detector
//!
//! Pure accounting: after each step the driver hashes its output and
//! compares against the hash recorded for the same pipeline+step position
//! on the previous run. On a match the step still ran to completion — this
//! only tracks that its downstream effects *could* have been elided, for
//! later optimization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pipeline_domain::{Dataset, PipelineError};
use sha2::{Digest, Sha256};

/// Incremental SHA-256 over each row's canonical JSON form, truncated to a
/// 16-hex-char prefix. Stable across identical row sequences with identical
/// field order; changes under any row addition, removal, or mutation.
pub fn hash_dataset(data: &Dataset) -> String {
    let mut hasher = Sha256::new();
    for row in data.iter() {
        let json = crate::uri::row_to_json(row);
        hasher.update(json.to_string().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// JSON-mapping-backed store of `"{pipeline}:step_{i}"` → hash, read and
/// written wholesale (the mapping is expected to stay small: one entry per
/// step per distinct pipeline ever run with `jit: true`).
pub struct HashStore {
    path: PathBuf,
}

impl HashStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn key(pipeline_name: &str, step_index: usize) -> String {
        format!("{pipeline_name}:step_{step_index}")
    }

    fn read_map(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path).ok().and_then(|text| serde_json::from_str(&text).ok()).unwrap_or_default()
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), PipelineError> {
        if let Some(dir) = Path::new(&self.path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| PipelineError::Internal(format!("creating hash store directory: {e}")))?;
            }
        }
        let text = serde_json::to_string_pretty(map).map_err(|e| PipelineError::Internal(format!("serializing hash store: {e}")))?;
        std::fs::write(&self.path, text).map_err(|e| PipelineError::Internal(format!("writing hash store: {e}")))
    }

    /// Look up the hash recorded for this pipeline+step position on a prior
    /// run, returning `None` on first run or a missing position.
    pub fn previous_hash(&self, pipeline_name: &str, step_index: usize) -> Option<String> {
        self.read_map().get(&Self::key(pipeline_name, step_index)).cloned()
    }

    pub fn record_hash(&self, pipeline_name: &str, step_index: usize, hash: &str) -> Result<(), PipelineError> {
        let mut map = self.read_map();
        map.insert(Self::key(pipeline_name, step_index), hash.to_string());
        self.write_map(&map)
    }

    /// Compute `data`'s hash, compare against the previously recorded hash
    /// for this position, record the new hash, and report whether it
    /// matched (the driver increments `ctx.jit_steps_skipped` on `true`).
    pub fn check_and_record(&self, pipeline_name: &str, step_index: usize, data: &Dataset) -> Result<bool, PipelineError> {
        let hash = hash_dataset(data);
        let matched = self.previous_hash(pipeline_name, step_index).as_deref() == Some(hash.as_str());
        self.record_hash(pipeline_name, step_index, &hash)?;
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::{Row, Value};
    use tempfile::tempdir;

    #[test]
    fn hash_is_stable_for_identical_rows() {
        let data = Dataset::from_rows(vec![Row::new().with("a", Value::Int(1))]);
        assert_eq!(hash_dataset(&data), hash_dataset(&data));
    }

    #[test]
    fn hash_changes_on_row_mutation() {
        let a = Dataset::from_rows(vec![Row::new().with("a", Value::Int(1))]);
        let b = Dataset::from_rows(vec![Row::new().with("a", Value::Int(2))]);
        assert_ne!(hash_dataset(&a), hash_dataset(&b));
    }

    #[test]
    fn check_and_record_detects_repeat_output() {
        let dir = tempdir().unwrap();
        let store = HashStore::new(dir.path().join("hashes.json"));
        let data = Dataset::from_rows(vec![Row::new().with("a", Value::Int(1))]);

        assert_eq!(store.check_and_record("p", 0, &data).unwrap(), false);
        assert_eq!(store.check_and_record("p", 0, &data).unwrap(), true);
    }
}
