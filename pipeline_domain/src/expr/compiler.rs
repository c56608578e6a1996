// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Compiler
//!
//! Compiles a source string into a [`CompiledExpr`] (parse + validate, once)
//! and evaluates it against a [`Row`] any number of times. Compiled ASTs are
//! memoized in a bounded LRU keyed by source text, shared across every step
//! of a run via [`ExprCache`] — a node that filters a million rows through
//! the same predicate parses it exactly once.
//!
//! A compile-time error (bad syntax, a blocked name, a disallowed method) is
//! returned to the caller. A *runtime* error evaluating one row — a missing
//! field, a type mismatch, an arithmetic error — is swallowed and yields
//! [`Value::Null`] for that row, matching the upstream evaluator's
//! try/except-returns-None behavior; one bad row must never abort a filter
//! or compute pass over the rest of the dataset.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::PipelineError;
use crate::expr::ast::{ArithOp, CmpOp, Expr};
use crate::expr::lexer::tokenize;
use crate::expr::parser::parse;
use crate::value::{Row, Value};

/// Default capacity of the shared compiled-expression cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A parsed, validated expression ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self, PipelineError> {
        let tokens = tokenize(source)?;
        let ast = parse(&tokens)?;
        Ok(CompiledExpr {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one row. Never fails: evaluation errors (missing
    /// field, type mismatch, divide-by-zero) resolve to `Value::Null`.
    pub fn eval(&self, row: &Row) -> Value {
        eval_node(&self.ast, row).unwrap_or(Value::Null)
    }

    /// Evaluate and interpret the result as a filter predicate using
    /// [`Value::is_truthy`].
    pub fn eval_bool(&self, row: &Row) -> bool {
        self.eval(row).is_truthy()
    }
}

/// Evaluation failure for one row. Never surfaced to callers of
/// [`CompiledExpr::eval`]; only used internally to short-circuit a node.
struct EvalError;

fn eval_node(expr: &Expr, row: &Row) -> Result<Value, EvalError> {
    match expr {
        Expr::IntLit(v) => Ok(Value::Int(*v)),
        Expr::FloatLit(v) => Ok(Value::Float(*v)),
        Expr::StrLit(v) => Ok(Value::String(v.clone())),
        Expr::BoolLit(v) => Ok(Value::Bool(*v)),
        Expr::NoneLit => Ok(Value::Null),
        Expr::FieldRef(name) => Ok(row.get(name)),

        Expr::Not(inner) => Ok(Value::Bool(!eval_node(inner, row)?.is_truthy())),
        Expr::Neg(inner) => {
            let v = eval_node(inner, row)?;
            match v {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Err(EvalError),
            }
        }

        Expr::And(values) => {
            for v in values {
                if !eval_node(v, row)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(values) => {
            for v in values {
                if eval_node(v, row)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }

        Expr::Compare { left, chain } => {
            let mut lhs = eval_node(left, row)?;
            for (op, rhs_expr) in chain {
                let rhs = eval_node(rhs_expr, row)?;
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Bool(false));
                }
                if !compare(*op, &lhs, &rhs) {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }

        Expr::Arith { op, left, right } => {
            let lhs = eval_node(left, row)?;
            let rhs = eval_node(right, row)?;
            arith(*op, &lhs, &rhs)
        }

        Expr::Ternary { test, body, orelse } => {
            if eval_node(test, row)?.is_truthy() {
                eval_node(body, row)
            } else {
                eval_node(orelse, row)
            }
        }

        Expr::Call { name, args } => {
            let values: Result<Vec<Value>, EvalError> = args.iter().map(|a| eval_node(a, row)).collect();
            call_free_function(name, &values?)
        }

        Expr::MethodCall { receiver, method, args } => {
            let recv = eval_node(receiver, row)?;
            if recv.is_null() {
                return Ok(Value::Null);
            }
            let values: Result<Vec<Value>, EvalError> = args.iter().map(|a| eval_node(a, row)).collect();
            call_method(&recv, method, &values?)
        }
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> bool {
    use std::cmp::Ordering;
    match op {
        CmpOp::Eq => a == b,
        CmpOp::NotEq => a != b,
        _ => match a.partial_cmp(b) {
            Some(ord) => match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::LtEq => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::GtEq => ord != Ordering::Less,
                CmpOp::Eq | CmpOp::NotEq => unreachable!(),
            },
            None => false,
        },
    }
}

fn arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    // String `+` is concatenation, matching Python's `str + str`.
    if op == ArithOp::Add {
        if let (Value::String(x), Value::String(y)) = (a, b) {
            return Ok(Value::String(format!("{x}{y}")));
        }
    }

    let (x, y) = (a.as_f64().ok_or(EvalError)?, b.as_f64().ok_or(EvalError)?);
    let both_int = matches!(a, Value::Int(_) | Value::Bool(_)) && matches!(b, Value::Int(_) | Value::Bool(_));

    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => {
            if y == 0.0 {
                return Err(EvalError);
            }
            return Ok(Value::Float(x / y));
        }
        ArithOp::FloorDiv => {
            if y == 0.0 {
                return Err(EvalError);
            }
            (x / y).floor()
        }
        ArithOp::Mod => {
            if y == 0.0 {
                return Err(EvalError);
            }
            x.rem_euclid(y)
        }
    };

    if both_int {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn call_free_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let first = args.first();
    match name {
        "len" => match first {
            Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
            Some(Value::List(l)) => Ok(Value::Int(l.len() as i64)),
            Some(Value::Row(r)) => Ok(Value::Int(r.len() as i64)),
            _ => Err(EvalError),
        },
        "int" => first.and_then(Value::as_i64).map(Value::Int).ok_or(EvalError),
        "float" => first.and_then(Value::as_f64).map(Value::Float).ok_or(EvalError),
        "str" => first.map(|v| Value::String(v.to_display_string())).ok_or(EvalError),
        "bool" => first.map(|v| Value::Bool(v.is_truthy())).ok_or(EvalError),
        "abs" => match first {
            Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
            Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
            _ => Err(EvalError),
        },
        "round" => match first {
            Some(Value::Int(i)) => Ok(Value::Int(*i)),
            Some(Value::Float(f)) => Ok(Value::Float(f.round())),
            _ => Err(EvalError),
        },
        "min" | "max" => {
            let nums: Vec<&Value> = match first {
                Some(Value::List(l)) => l.iter().collect(),
                _ => args.iter().collect(),
            };
            if nums.is_empty() {
                return Err(EvalError);
            }
            let pick = nums
                .into_iter()
                .reduce(|a, b| {
                    let a_lt_b = a.partial_cmp(b) == Some(std::cmp::Ordering::Less);
                    if (name == "min") == a_lt_b {
                        a
                    } else {
                        b
                    }
                })
                .ok_or(EvalError)?;
            Ok(pick.clone())
        }
        "sum" => match first {
            Some(Value::List(l)) => {
                let total: f64 = l.iter().filter_map(Value::as_f64).sum();
                if l.iter().all(|v| matches!(v, Value::Int(_))) {
                    Ok(Value::Int(total as i64))
                } else {
                    Ok(Value::Float(total))
                }
            }
            _ => Err(EvalError),
        },
        "sorted" => match first {
            Some(Value::List(l)) => {
                let mut out = l.clone();
                out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                Ok(Value::List(out))
            }
            _ => Err(EvalError),
        },
        "list" => match first {
            Some(Value::List(l)) => Ok(Value::List(l.clone())),
            Some(other) => Ok(Value::List(vec![other.clone()])),
            None => Ok(Value::List(Vec::new())),
        },
        _ => Err(EvalError),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let s = match receiver {
        Value::String(s) => s.clone(),
        _ => return call_free_function(method, &std::iter::once(receiver.clone()).chain(args.iter().cloned()).collect::<Vec<_>>()),
    };

    match method {
        "upper" => Ok(Value::String(s.to_uppercase())),
        "lower" => Ok(Value::String(s.to_lowercase())),
        "strip" => Ok(Value::String(s.trim().to_string())),
        "title" => Ok(Value::String(title_case(&s))),
        "startswith" => {
            let prefix = args.first().and_then(|v| v.as_str()).ok_or(EvalError)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "endswith" => {
            let suffix = args.first().and_then(|v| v.as_str()).ok_or(EvalError)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        "replace" => {
            let from = args.first().and_then(|v| v.as_str()).ok_or(EvalError)?;
            let to = args.get(1).and_then(|v| v.as_str()).ok_or(EvalError)?;
            Ok(Value::String(s.replace(from, to)))
        }
        "split" => {
            let sep = args.first().and_then(|v| v.as_str());
            let parts: Vec<Value> = match sep {
                Some(sep) => s.split(sep).map(|p| Value::String(p.to_string())).collect(),
                None => s.split_whitespace().map(|p| Value::String(p.to_string())).collect(),
            };
            Ok(Value::List(parts))
        }
        _ => Err(EvalError),
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shared, bounded cache of compiled expressions, keyed by source text.
///
/// Construct one per pipeline run and thread it to every step that
/// evaluates expressions (`transform`, `clean`, `guard`, `branch`), so a
/// predicate reused across many nodes in the same run compiles once.
pub struct ExprCache {
    inner: Mutex<LruCache<String, Arc<CompiledExpr>>>,
}

impl ExprCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Fetch a cached compile, or parse, cache, and return a fresh one.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompiledExpr>, PipelineError> {
        if let Some(hit) = self.inner.lock().get(source) {
            return Ok(hit.clone());
        }
        let compiled = Arc::new(CompiledExpr::compile(source)?);
        self.inner.lock().put(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExprCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    fn row_of(pairs: &[(&str, Value)]) -> Row {
        let mut r = Row::new();
        for (k, v) in pairs {
            r.set(k.to_string(), v.clone());
        }
        r
    }

    #[test]
    fn comparison_chain_is_anded() {
        let expr = CompiledExpr::compile("0 < age < 100").unwrap();
        assert!(expr.eval_bool(&row_of(&[("age", Value::Int(30))])));
        assert!(!expr.eval_bool(&row_of(&[("age", Value::Int(150))])));
    }

    #[test]
    fn missing_field_compares_false_not_error() {
        let expr = CompiledExpr::compile("age > 10").unwrap();
        assert!(!expr.eval_bool(&row_of(&[])));
    }

    #[test]
    fn string_method_call_allowed() {
        let expr = CompiledExpr::compile("name.upper()").unwrap();
        let out = expr.eval(&row_of(&[("name", Value::String("ada".into()))]));
        assert_eq!(out, Value::String("ADA".into()));
    }

    #[test]
    fn blocked_name_is_a_compile_error() {
        assert!(CompiledExpr::compile("eval(x)").is_err());
        assert!(CompiledExpr::compile("open(x)").is_err());
    }

    #[test]
    fn ternary_and_arithmetic() {
        let expr = CompiledExpr::compile("price * 2 if qty > 1 else price").unwrap();
        let row = row_of(&[("price", Value::Float(10.0)), ("qty", Value::Int(3))]);
        assert_eq!(expr.eval(&row), Value::Float(20.0));
    }

    #[test]
    fn division_by_zero_swallows_to_null() {
        let expr = CompiledExpr::compile("a / b").unwrap();
        let row = row_of(&[("a", Value::Int(1)), ("b", Value::Int(0))]);
        assert_eq!(expr.eval(&row), Value::Null);
    }

    #[test]
    fn cache_reuses_compiled_ast() {
        let cache = ExprCache::new(4);
        let a = cache.get_or_compile("x > 1").unwrap();
        let b = cache.get_or_compile("x > 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
