// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared helper for steps that compose nested step lists (`branch`,
//! `parallel`): parsing the `[{step_type: config}, ...]` shape out of a
//! [`Value`] tree, and running such a list as a mini sub-pipeline against an
//! isolated child [`Context`].

use indexmap::IndexMap;
use pipeline_domain::{Context, Dataset, PipelineError, Value};

/// Parse a `Value::List` of single-key `Value::Row`s into `(step_type,
/// config)` pairs, the same one-key-map-per-step shape the linear `steps:`
/// form of a pipeline definition uses.
pub fn parse_step_list(v: &Value) -> Vec<(String, IndexMap<String, Value>)> {
    let Value::List(items) = v else { return Vec::new() };
    items
        .iter()
        .filter_map(|item| {
            let Value::Row(row) = item else { return None };
            if row.len() != 1 {
                return None;
            }
            let (step_type, config) = row.iter().next()?;
            let config = match config {
                Value::Row(r) => r.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                _ => IndexMap::new(),
            };
            Some((step_type.to_string(), config))
        })
        .collect()
}

/// Run `steps` in sequence against an isolated child of `parent`, seeded
/// with `data`. Returns the final dataset. A step-runtime error aborts the
/// sub-pipeline and propagates to the caller, which (per `branch`/`parallel`
/// semantics) folds it into an `_error` row rather than failing the whole
/// node.
pub async fn run_steps(
    steps: &[(String, IndexMap<String, Value>)],
    data: Dataset,
    parent: &Context,
) -> Result<Dataset, PipelineError> {
    let mut child = parent.child();
    child.set_data(data);
    for (step_type, config) in steps {
        let step = parent.registry.get(step_type)?;
        let out = step.execute(config, &mut child).await?;
        child.set_data(out);
    }
    Ok(child.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::Row;

    #[test]
    fn parses_one_key_step_maps() {
        let steps = Value::List(vec![Value::Row(
            Row::new().with("transform", Value::Row(Row::new().with("limit", Value::Int(1)))),
        )]);
        let parsed = parse_step_list(&steps);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "transform");
    }
}
