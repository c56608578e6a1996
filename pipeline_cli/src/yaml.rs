// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline YAML Parsing
//!
//! Turns a pipeline description on disk into a [`PipelineDefinition`]. Three
//! things happen here that are deliberately *not* the domain's concern
//! (`pipeline_domain::pipeline_def` says so directly):
//!
//! 1. `--var` overrides are merged into the file's own `vars:` map, CLI
//!    values taking precedence.
//! 2. Every string inside a `config:` mapping is expanded twice: first
//!    environment variables (`$VAR` / `${VAR}`), then pipeline variables
//!    (`{key}`).
//! 3. A YAML 1.1 boolean-like scalar used as a *mapping key* (`on`, `off`,
//!    `yes`, `no`, `true`, `false`) is coerced back to its literal string
//!    form, so a step config key named `on` survives a round trip through a
//!    YAML parser that treats bare `on` as a boolean.

use std::path::Path;

use serde_yaml::Value as YamlValue;
use thiserror::Error;

use pipeline_domain::{PipelineDefinition, PipelineError};

#[derive(Debug, Error)]
pub enum YamlError {
    #[error("reading {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("{path} is not a mapping with a top-level 'name' and 'steps' or 'graph'")]
    NotAPipeline { path: String },

    #[error("parsing {path}: {source}")]
    Parse { path: String, #[source] source: serde_yaml::Error },
}

impl From<YamlError> for PipelineError {
    fn from(err: YamlError) -> Self {
        PipelineError::Definition(err.to_string())
    }
}

/// Loads and fully expands the pipeline at `path`, applying `overrides` on
/// top of the file's own `vars:` map before expansion.
pub fn parse_pipeline_file(path: &Path, overrides: &[(String, String)]) -> Result<PipelineDefinition, YamlError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| YamlError::Io { path: path.display().to_string(), source })?;
    parse_pipeline_str(&text, overrides, &path.display().to_string())
}

pub fn parse_pipeline_str(text: &str, overrides: &[(String, String)], label: &str) -> Result<PipelineDefinition, YamlError> {
    let mut doc: YamlValue =
        serde_yaml::from_str(text).map_err(|source| YamlError::Parse { path: label.to_string(), source })?;

    let mapping = doc.as_mapping_mut().ok_or_else(|| YamlError::NotAPipeline { path: label.to_string() })?;
    let has_name = mapping.contains_key("name");
    let has_steps_or_graph = mapping.contains_key("steps") || mapping.contains_key("graph");
    if !has_name || !has_steps_or_graph {
        return Err(YamlError::NotAPipeline { path: label.to_string() });
    }

    let vars = merge_vars(mapping, overrides);
    fix_bool_keys(&mut doc);
    expand_strings(&mut doc, &vars);

    let expanded_text = serde_yaml::to_string(&doc).map_err(|source| YamlError::Parse { path: label.to_string(), source })?;
    serde_yaml::from_str(&expanded_text).map_err(|source| YamlError::Parse { path: label.to_string(), source })
}

/// Merges `--var` overrides into the document's `vars:` map (creating it if
/// absent) and returns the final string-keyed map used for `{key}`
/// expansion. CLI overrides always win over the file's own values.
fn merge_vars(mapping: &mut serde_yaml::Mapping, overrides: &[(String, String)]) -> std::collections::HashMap<String, String> {
    let vars_key = YamlValue::String("vars".to_string());
    if !mapping.contains_key("vars") {
        mapping.insert(vars_key.clone(), YamlValue::Mapping(serde_yaml::Mapping::new()));
    }

    let mut resolved = std::collections::HashMap::new();
    if let Some(YamlValue::Mapping(vars_map)) = mapping.get(&vars_key) {
        for (k, v) in vars_map {
            if let Some(key) = k.as_str() {
                resolved.insert(key.to_string(), scalar_to_string(v));
            }
        }
    }
    for (k, v) in overrides {
        resolved.insert(k.clone(), v.clone());
    }

    if let Some(YamlValue::Mapping(vars_map)) = mapping.get_mut(&vars_key) {
        for (k, v) in &resolved {
            vars_map.insert(YamlValue::String(k.clone()), YamlValue::String(v.clone()));
        }
    }

    resolved
}

fn scalar_to_string(v: &YamlValue) -> String {
    match v {
        YamlValue::String(s) => s.clone(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

/// Environment-expand first (`$VAR` / `${VAR}`), then substitute `{key}`
/// with each pipeline variable's string form. Unknown `{key}` references are
/// left untouched.
fn expand_vars(text: &str, vars: &std::collections::HashMap<String, String>) -> String {
    let env_expanded = expand_env(text);
    let mut result = env_expanded;
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

fn expand_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '$' && i + 1 < bytes.len() {
            if bytes[i + 1] == '{' {
                if let Some(end) = bytes[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = bytes[i + 2..i + 2 + end].iter().collect();
                    if let Ok(val) = std::env::var(&name) {
                        out.push_str(&val);
                    }
                    i += 2 + end + 1;
                    continue;
                }
            } else if bytes[i + 1].is_alphabetic() || bytes[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_alphanumeric() || bytes[end] == '_') {
                    end += 1;
                }
                let name: String = bytes[start..end].iter().collect();
                if let Ok(val) = std::env::var(&name) {
                    out.push_str(&val);
                }
                i = end;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Recursively expands every string scalar reachable from the document.
/// Expanding the whole tree (not just nodes named `config`) matches the
/// original's recursive `_expand_config` walk and costs nothing extra since
/// `{key}`/`$VAR` only ever appear in string scalars anyway.
fn expand_strings(value: &mut YamlValue, vars: &std::collections::HashMap<String, String>) {
    match value {
        YamlValue::String(s) => *s = expand_vars(s, vars),
        YamlValue::Sequence(seq) => {
            for item in seq {
                expand_strings(item, vars);
            }
        }
        YamlValue::Mapping(map) => {
            let entries: Vec<(YamlValue, YamlValue)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            map.clear();
            for (k, mut v) in entries {
                expand_strings(&mut v, vars);
                map.insert(k, v);
            }
        }
        _ => {}
    }
}

/// Rewrites any mapping key that parsed as a YAML 1.1 boolean literal
/// (`on`/`off`/`yes`/`no`/`true`/`false`) back to its lowercase string form.
fn fix_bool_keys(value: &mut YamlValue) {
    match value {
        YamlValue::Sequence(seq) => {
            for item in seq {
                fix_bool_keys(item);
            }
        }
        YamlValue::Mapping(map) => {
            let entries: Vec<(YamlValue, YamlValue)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            map.clear();
            for (k, mut v) in entries {
                fix_bool_keys(&mut v);
                let fixed_key = match &k {
                    YamlValue::Bool(b) => YamlValue::String(b.to_string()),
                    other => other.clone(),
                };
                map.insert(fixed_key, v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_linear_pipeline() {
        let text = r#"
name: demo
steps:
  - transform:
      select: [a, b]
"#;
        let def = parse_pipeline_str(text, &[], "demo.yaml").unwrap();
        assert_eq!(def.name, "demo");
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn rejects_documents_without_name_or_steps() {
        let text = "steps:\n  - transform: {}\n";
        assert!(parse_pipeline_str(text, &[], "bad.yaml").is_err());

        let text = "name: demo\n";
        assert!(parse_pipeline_str(text, &[], "bad.yaml").is_err());
    }

    #[test]
    fn cli_overrides_win_over_file_vars() {
        let text = r#"
name: demo
vars:
  greeting: hello
steps:
  - transform:
      compute:
        msg: "'{greeting}'"
"#;
        let def = parse_pipeline_str(text, &[("greeting".to_string(), "bye".to_string())], "demo.yaml").unwrap();
        assert_eq!(def.vars.get("greeting").and_then(|v| v.as_str()), Some("bye"));
    }

    #[test]
    fn expands_env_and_pipeline_vars_in_config_strings() {
        std::env::set_var("PIPELINE_CLI_TEST_VAR", "envval");
        let text = r#"
name: demo
vars:
  name_var: world
steps:
  - fetch:
      url: "$PIPELINE_CLI_TEST_VAR/{name_var}"
"#;
        let def = parse_pipeline_str(text, &[], "demo.yaml").unwrap();
        let url = def.steps[0].config.get("url").and_then(|v| v.as_str()).unwrap().to_string();
        assert_eq!(url, "envval/world");
    }

    #[test]
    fn fixes_yaml_11_boolean_keys_back_to_strings() {
        let text = "name: demo\nsteps:\n  - transform:\n      on: value\n";
        let def = parse_pipeline_str(text, &[], "demo.yaml").unwrap();
        assert!(def.steps[0].config.contains_key("on"));
    }
}
