// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Linter
//!
//! A pure, no-I/O static check over a linear `steps:` pipeline, run by the
//! `lint` command. Required-config alternatives come from each step type's
//! registered `StepMeta` rather than a hardcoded table, so a new step type
//! only needs to declare `required_config` once to be covered here.
//!
//! The explicit `graph:` form is out of scope: the system this was ported
//! from only ever linted linear pipelines, and a DAG's branching shape
//! doesn't map cleanly onto the "directly before"/"first step"/"adjacent
//! duplicate" checks below.

use pipeline_domain::{PipelineDefinition, StepRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintLevel {
    Error,
    Warning,
    Suggestion,
}

impl LintLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LintLevel::Error => "ERR",
            LintLevel::Warning => "WARN",
            LintLevel::Suggestion => "TIP",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LintFinding {
    pub level: LintLevel,
    pub step_index: Option<usize>,
    pub message: String,
    /// The mistake-proofing/andon/waste-elimination category this finding
    /// illustrates, surfaced verbatim in `lint`'s output.
    pub principle: &'static str,
}

const LOAD_LIKE: &[&str] = &["load"];
const SOURCE_BEFORE_LOAD: &[&str] = &["fetch", "scrape"];

pub fn lint(def: &PipelineDefinition, registry: &StepRegistry) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    if def.is_graph() {
        return findings;
    }

    if def.steps.is_empty() {
        findings.push(LintFinding {
            level: LintLevel::Error,
            step_index: None,
            message: "pipeline has no steps".to_string(),
            principle: "POKA-YOKE",
        });
        return findings;
    }

    for (i, step) in def.steps.iter().enumerate() {
        if !registry.contains(&step.step_type) {
            findings.push(LintFinding {
                level: LintLevel::Error,
                step_index: Some(i),
                message: format!("unknown step type '{}'", step.step_type),
                principle: "POKA-YOKE",
            });
            continue;
        }

        let meta = match registry.get_meta(&step.step_type) {
            Ok(meta) => meta,
            Err(_) => continue,
        };

        if !meta.required_config.is_empty() && !meta.required_config.iter().any(|k| step.config.contains_key(*k)) {
            findings.push(LintFinding {
                level: LintLevel::Error,
                step_index: Some(i),
                message: format!(
                    "step '{}' is missing required config: one of [{}]",
                    step.step_type,
                    meta.required_config.join(", ")
                ),
                principle: "POKA-YOKE",
            });
        }
    }

    if let Some(first) = def.steps.first() {
        if LOAD_LIKE.contains(&first.step_type.as_str()) {
            findings.push(LintFinding {
                level: LintLevel::Warning,
                step_index: Some(0),
                message: "'load' as the first step has nothing to write yet".to_string(),
                principle: "JIDOKA",
            });
        }
    }

    for i in 0..def.steps.len().saturating_sub(1) {
        let (a, b) = (&def.steps[i], &def.steps[i + 1]);

        if a.step_type == b.step_type && a.config == b.config {
            findings.push(LintFinding {
                level: LintLevel::Warning,
                step_index: Some(i),
                message: format!("step {} and {} are identical adjacent '{}' steps", i, i + 1, a.step_type),
                principle: "MUDA",
            });
        }

        if SOURCE_BEFORE_LOAD.contains(&a.step_type.as_str()) && LOAD_LIKE.contains(&b.step_type.as_str()) {
            findings.push(LintFinding {
                level: LintLevel::Suggestion,
                step_index: Some(i),
                message: format!("consider a 'guard' step between '{}' and 'load' to validate fetched data", a.step_type),
                principle: "JIDOKA",
            });
        }
    }

    let has_terminal_output = def.steps.iter().any(|s| {
        LOAD_LIKE.contains(&s.step_type.as_str())
            || (s.step_type == "file" && s.config.get("action").and_then(|v| v.as_str()) == Some("write"))
    });
    if !has_terminal_output {
        findings.push(LintFinding {
            level: LintLevel::Suggestion,
            step_index: None,
            message: "pipeline has no 'load' or file-write step; output is discarded".to_string(),
            principle: "MUDA",
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pipeline_domain::pipeline_def::{OnError, StepDef};
    use pipeline_domain::Value;
    use std::collections::HashMap;

    fn def(steps: Vec<StepDef>) -> PipelineDefinition {
        PipelineDefinition {
            name: "t".to_string(),
            description: String::new(),
            vars: HashMap::new(),
            steps,
            graph: indexmap::IndexMap::new(),
            on_error: OnError::Stop,
            jit: false,
            checkpoint: false,
        }
    }

    fn step(step_type: &str, config: Vec<(&str, Value)>) -> StepDef {
        StepDef { step_type: step_type.to_string(), config: config.into_iter().map(|(k, v)| (k.to_string(), v)).collect() }
    }

    #[test]
    fn empty_pipeline_is_an_error() {
        let registry = StepRegistry::new();
        let findings = lint(&def(Vec::new()), &registry);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].level, LintLevel::Error);
    }

    #[test]
    fn fetch_directly_before_load_suggests_a_guard() {
        let registry = StepRegistry::new();
        registry.register("fetch", || unimplemented!(), pipeline_domain::step::StepMeta { is_source: true, ..Default::default() });
        registry.register("load", || unimplemented!(), pipeline_domain::step::StepMeta { required_config: vec!["target"], ..Default::default() });

        let pipeline = def(vec![step("fetch", vec![("url", Value::String("x".to_string()))]), step("load", vec![("target", Value::String("stdout".to_string()))])]);
        let findings = lint(&pipeline, &registry);

        assert!(findings.iter().any(|f| f.principle == "JIDOKA" && f.level == LintLevel::Suggestion));
        assert!(!findings.iter().any(|f| f.level == LintLevel::Error));
    }

    #[test]
    fn missing_required_config_is_an_error() {
        let registry = StepRegistry::new();
        registry.register("load", || unimplemented!(), pipeline_domain::step::StepMeta { required_config: vec!["target"], ..Default::default() });

        let pipeline = def(vec![step("load", vec![])]);
        let findings = lint(&pipeline, &registry);

        assert!(findings.iter().any(|f| f.level == LintLevel::Error && f.message.contains("missing required config")));
    }

    #[test]
    fn duplicate_adjacent_steps_are_flagged() {
        let registry = StepRegistry::new();
        registry.register("clean", || unimplemented!(), pipeline_domain::step::StepMeta::default());

        let cfg: Vec<(&str, Value)> = vec![("trim", Value::Bool(true))];
        let pipeline = def(vec![step("clean", cfg.clone()), step("clean", cfg)]);
        let findings = lint(&pipeline, &registry);

        assert!(findings.iter().any(|f| f.principle == "MUDA" && f.level == LintLevel::Warning));
    }
}
