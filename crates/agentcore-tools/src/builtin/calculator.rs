// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use agentcore_model::tool::{ParameterType, Tool as ToolSchema, ToolParameter};

use crate::executor::ToolImplementation;

/// Evaluates a single arithmetic expression in-process: `+ - * / %` with
/// parentheses and unary minus, `f64` throughout, checked against division
/// by zero and NaN/infinite results.
#[derive(Default)]
pub struct CalculatorTool;

#[async_trait]
impl ToolImplementation for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "calculator",
            "Evaluate an arithmetic expression, e.g. '(2 + 3) * 4 / 2'.",
            vec![ToolParameter::required("expression", ParameterType::String, "arithmetic expression")],
        )
    }

    async fn call(&self, args: Value) -> Result<String, String> {
        let expr = args["expression"].as_str().unwrap_or_default();
        evaluate(expr).map(|v| v.to_string())
    }
}

/// Recursive-descent evaluator over `+ - * / % ( )` and unary `-`.
fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input at token {}", parser.pos));
    }
    if value.is_nan() || value.is_infinite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| format!("invalid number literal '{text}'"))?;
                tokens.push(Token::Number(n));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => { self.pos += 1; value += self.parse_term()?; }
                Some(Token::Minus) => { self.pos += 1; value -= self.parse_term()?; }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, String> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => { self.pos += 1; value *= self.parse_unary()?; }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.parse_unary()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let rhs = self.parse_unary()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value %= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<f64, String> {
        if let Some(Token::Minus) = self.peek() {
            self.pos += 1;
            return Ok(-self.parse_unary()?);
        }
        if let Some(Token::Plus) = self.peek() {
            self.pos += 1;
            return self.parse_unary();
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Number(n)) => { let n = *n; self.pos += 1; Ok(n) }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.parse_expr()?;
                match self.peek() {
                    Some(Token::RParen) => { self.pos += 1; Ok(value) }
                    _ => Err("expected closing parenthesis".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evaluates_operator_precedence() {
        let t = CalculatorTool;
        let out = t.call(serde_json::json!({"expression": "2 + 3 * 4"})).await.unwrap();
        assert_eq!(out, "14");
    }

    #[tokio::test]
    async fn evaluates_parentheses() {
        let t = CalculatorTool;
        let out = t.call(serde_json::json!({"expression": "(2 + 3) * 4"})).await.unwrap();
        assert_eq!(out, "20");
    }

    #[tokio::test]
    async fn evaluates_unary_minus() {
        let t = CalculatorTool;
        let out = t.call(serde_json::json!({"expression": "-5 + 10"})).await.unwrap();
        assert_eq!(out, "5");
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        let t = CalculatorTool;
        let err = t.call(serde_json::json!({"expression": "1 / 0"})).await.unwrap_err();
        assert!(err.contains("division by zero"));
    }

    #[tokio::test]
    async fn malformed_expression_is_an_error() {
        let t = CalculatorTool;
        let err = t.call(serde_json::json!({"expression": "2 + * 3"})).await.unwrap_err();
        assert!(!err.is_empty());
    }

    #[tokio::test]
    async fn trailing_garbage_is_rejected() {
        let t = CalculatorTool;
        let err = t.call(serde_json::json!({"expression": "2 + 2) "})).await.unwrap_err();
        assert!(err.contains("trailing"));
    }
}
