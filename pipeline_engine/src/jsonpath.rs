// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # JSONPath-lite Extraction
//!
//! A restricted dotted-path extractor used by `transform.flatten` and
//! `fetch`'s `extract` config: `a.b.c`, `a.items[0]`, `a.items[*]`. No
//! filter expressions, slices, or recursive descent — the registry's
//! fixed-shape row model doesn't need them.

use pipeline_domain::Value;

enum Index {
    At(usize),
    All,
}

struct Segment {
    name: Option<String>,
    indices: Vec<Index>,
}

fn parse_segments(path: &str) -> Vec<Segment> {
    path.split('.')
        .map(|part| {
            let mut indices = Vec::new();
            let mut name_end = part.len();
            let mut rest = part;
            if let Some(bracket) = part.find('[') {
                name_end = bracket;
                rest = &part[bracket..];
                while let Some(close) = rest.find(']') {
                    let inner = &rest[1..close];
                    if inner == "*" {
                        indices.push(Index::All);
                    } else if let Ok(i) = inner.parse::<usize>() {
                        indices.push(Index::At(i));
                    }
                    rest = &rest[close + 1..];
                }
            }
            let name = part[..name_end].trim();
            Segment {
                name: if name.is_empty() { None } else { Some(name.to_string()) },
                indices,
            }
        })
        .collect()
}

/// Extract a value (or a `Value::List` of matches when `[*]` is used) from
/// `root` following `path`. Absent fields and out-of-range indices resolve
/// to `Value::Null` rather than erroring.
pub fn extract(root: &Value, path: &str) -> Value {
    if path.trim().is_empty() {
        return root.clone();
    }
    let segments = parse_segments(path);
    let mut current: Vec<Value> = vec![root.clone()];

    for seg in &segments {
        let mut next: Vec<Value> = Vec::new();
        for v in current {
            let stepped = match &seg.name {
                Some(name) => match v {
                    Value::Row(r) => r.get(name),
                    _ => Value::Null,
                },
                None => v,
            };
            let mut vs = vec![stepped];
            for idx in &seg.indices {
                let mut vs2 = Vec::new();
                for v in vs {
                    match (idx, v) {
                        (Index::At(i), Value::List(items)) => {
                            if let Some(x) = items.get(*i) {
                                vs2.push(x.clone());
                            }
                        }
                        (Index::All, Value::List(items)) => vs2.extend(items),
                        _ => {}
                    }
                }
                vs = vs2;
            }
            next.extend(vs);
        }
        current = next;
    }

    match current.len() {
        0 => Value::Null,
        1 => current.into_iter().next().unwrap(),
        _ => Value::List(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::Row;

    #[test]
    fn extracts_nested_field() {
        let root = Value::Row(Row::new().with("a", Value::Row(Row::new().with("b", Value::Int(7)))));
        assert_eq!(extract(&root, "a.b"), Value::Int(7));
    }

    #[test]
    fn extracts_wildcard_list() {
        let items = Value::List(vec![
            Value::Row(Row::new().with("x", Value::Int(1))),
            Value::Row(Row::new().with("x", Value::Int(2))),
        ]);
        let root = Value::Row(Row::new().with("items", items));
        let out = extract(&root, "items[*]");
        match out {
            Value::List(v) => assert_eq!(v.len(), 2),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn missing_path_is_null() {
        let root = Value::Row(Row::new());
        assert_eq!(extract(&root, "missing.field"), Value::Null);
    }
}
