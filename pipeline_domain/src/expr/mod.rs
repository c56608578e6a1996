// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Evaluator
//!
//! A small, sandboxed arithmetic/boolean/string expression language used by
//! `transform.compute`, `clean.filter`, `guard`, and `branch` to evaluate a
//! user-supplied string against a row without ever reaching for a full
//! scripting language. The pipeline is parse → validate → compile, with
//! compiled ASTs memoized so a predicate string is never reparsed per row.
//!
//! ```text
//! source text -> lexer -> tokens -> parser (+ name validation) -> Expr -> eval(row) -> Value
//! ```

mod ast;
mod compiler;
mod lexer;
mod parser;

pub use ast::Expr;
pub use compiler::{CompiledExpr, ExprCache, DEFAULT_CACHE_CAPACITY};
