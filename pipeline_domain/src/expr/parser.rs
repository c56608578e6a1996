// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Recursive-descent parser from tokens to [`Expr`], with compile-time
//! validation of the blocked-name list baked in: a forbidden call is a
//! parse error, never a runtime one.

use crate::error::PipelineError;
use crate::expr::ast::{ArithOp, CmpOp, Expr};
use crate::expr::lexer::Token;

/// Names that must never be reachable from an expression, mirroring the
/// upstream interpreter's sandbox.
const BLOCKED_NAMES: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "__import__",
    "open",
    "input",
    "globals",
    "locals",
    "vars",
    "dir",
    "getattr",
    "setattr",
    "delattr",
    "breakpoint",
];

/// Free functions and string methods reachable from an expression.
const SAFE_NAMES: &[&str] = &[
    "len", "int", "float", "str", "bool", "abs", "min", "max", "sum", "round", "sorted", "list", "upper", "lower",
    "strip", "replace", "split", "startswith", "endswith", "title",
];

pub fn parse(tokens: &[Token]) -> Result<Expr, PipelineError> {
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_ternary()?;
    p.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: Token) -> Result<(), PipelineError> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(PipelineError::Expression(format!(
                "expected {tok:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, PipelineError> {
        let body = self.parse_or()?;
        if *self.peek() == Token::If {
            self.advance();
            let test = self.parse_or()?;
            self.expect(Token::Else)?;
            let orelse = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, PipelineError> {
        let mut values = vec![self.parse_and()?];
        while *self.peek() == Token::Or {
            self.advance();
            values.push(self.parse_and()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::Or(values))
        }
    }

    fn parse_and(&mut self) -> Result<Expr, PipelineError> {
        let mut values = vec![self.parse_not()?];
        while *self.peek() == Token::And {
            self.advance();
            values.push(self.parse_not()?);
        }
        if values.len() == 1 {
            Ok(values.pop().unwrap())
        } else {
            Ok(Expr::And(values))
        }
    }

    fn parse_not(&mut self) -> Result<Expr, PipelineError> {
        if *self.peek() == Token::Not {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, PipelineError> {
        let left = self.parse_additive()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => CmpOp::Eq,
                Token::NotEq => CmpOp::NotEq,
                Token::Lt => CmpOp::Lt,
                Token::LtEq => CmpOp::LtEq,
                Token::Gt => CmpOp::Gt,
                Token::GtEq => CmpOp::GtEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            chain.push((op, rhs));
        }
        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                chain,
            })
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, PipelineError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, PipelineError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::SlashSlash => ArithOp::FloorDiv,
                Token::Percent => ArithOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, PipelineError> {
        if *self.peek() == Token::Minus {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, PipelineError> {
        let mut expr = self.parse_primary()?;
        loop {
            if *self.peek() == Token::Dot {
                self.advance();
                let name = match self.advance() {
                    Token::Ident(n) => n,
                    other => {
                        return Err(PipelineError::Expression(format!(
                            "expected method name after '.', found {other:?}"
                        )))
                    }
                };
                if !SAFE_NAMES.contains(&name.as_str()) {
                    return Err(PipelineError::Expression(format!(
                        "method '{name}' is not allowed in expressions"
                    )));
                }
                self.expect(Token::LParen)?;
                let args = self.parse_args()?;
                expr = Expr::MethodCall {
                    receiver: Box::new(expr),
                    method: name,
                    args,
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, PipelineError> {
        let mut args = Vec::new();
        if *self.peek() != Token::RParen {
            args.push(self.parse_ternary()?);
            while *self.peek() == Token::Comma {
                self.advance();
                args.push(self.parse_ternary()?);
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, PipelineError> {
        match self.advance() {
            Token::Int(v) => Ok(Expr::IntLit(v)),
            Token::Float(v) => Ok(Expr::FloatLit(v)),
            Token::Str(s) => Ok(Expr::StrLit(s)),
            Token::True => Ok(Expr::BoolLit(true)),
            Token::False => Ok(Expr::BoolLit(false)),
            Token::None_ => Ok(Expr::NoneLit),
            Token::LParen => {
                let inner = self.parse_ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if BLOCKED_NAMES.contains(&name.as_str()) {
                    return Err(PipelineError::Expression(format!(
                        "function '{name}' not allowed in expressions"
                    )));
                }
                if *self.peek() == Token::LParen {
                    self.advance();
                    if !SAFE_NAMES.contains(&name.as_str()) {
                        return Err(PipelineError::Expression(format!(
                            "function '{name}' not allowed in expressions"
                        )));
                    }
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::FieldRef(name))
                }
            }
            other => Err(PipelineError::Expression(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }
}
