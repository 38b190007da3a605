//! A restricted boolean/arithmetic expression language for the `conditional`
//! step: a hand-rolled tokenizer, recursive-descent parser and tree-walking
//! evaluator over `serde_json::Value`.
//!
//! The allow-list is intentionally small: no field-path indexing, no array
//! wildcards, no aggregate functions, just the identifiers, operators and
//! helper functions a condition actually needs.

use crate::context::Context;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Eof,
}

fn tokenize(input: &str) -> anyhow::Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    anyhow::bail!("unterminated string literal");
                }
                i += 1; // closing quote
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid number literal '{text}'"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "none" | "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => anyhow::bail!("unexpected character '{other}' in expression"),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Ident(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Function names permitted by the allow-list. Any other call syntax
/// (`Ident(...)`) is a parse-time error, forbidding attribute/function
/// access outside the allow-list.
const ALLOWED_FUNCTIONS: &[&str] = &["file_exists", "all_files_exist", "file_is_newer", "and", "or", "not"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> anyhow::Result<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            anyhow::bail!("expected {expected:?}, found {:?}", self.peek())
        }
    }

    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_not()?;
        while *self.peek() == Token::And {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> anyhow::Result<Expr> {
        if *self.peek() == Token::Not {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> anyhow::Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> anyhow::Result<Expr> {
        if *self.peek() == Token::Minus {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> anyhow::Result<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    if !ALLOWED_FUNCTIONS.contains(&name.as_str()) {
                        anyhow::bail!("function '{name}' is not in the allow-list");
                    }
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        args.push(self.parse_expr()?);
                        while *self.peek() == Token::Comma {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            other => anyhow::bail!("unexpected token {other:?}"),
        }
    }
}

fn parse(text: &str) -> anyhow::Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.peek() != Token::Eof {
        anyhow::bail!("unexpected trailing input near {:?}", parser.peek());
    }
    Ok(expr)
}

/// Missing names evaluate to falsy rather than error: an unresolved
/// identifier becomes `Value::Null`, checking artifacts first and falling
/// back to config.
fn resolve_ident(name: &str, context: &Context) -> Value {
    context
        .get(name)
        .cloned()
        .or_else(|| context.config_view().get(name).cloned())
        .unwrap_or(Value::Null)
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            if s.is_empty() {
                false
            } else if s.eq_ignore_ascii_case("true") {
                true
            } else if s.eq_ignore_ascii_case("false") {
                false
            } else {
                true
            }
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

fn arith(op: &ArithOp, l: Value, r: Value) -> anyhow::Result<Value> {
    let (a, b) = (
        as_f64(&l).ok_or_else(|| anyhow::anyhow!("'{l:?}' is not numeric"))?,
        as_f64(&r).ok_or_else(|| anyhow::anyhow!("'{r:?}' is not numeric"))?,
    );
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                anyhow::bail!("division by zero");
            }
            a / b
        }
    };
    Ok(serde_json::json!(result))
}

fn compare(op: &CmpOp, l: Value, r: Value) -> anyhow::Result<bool> {
    if *op == CmpOp::Eq {
        return Ok(l == r);
    }
    if *op == CmpOp::Ne {
        return Ok(l != r);
    }
    if let (Some(a), Some(b)) = (as_f64(&l), as_f64(&r)) {
        return Ok(match op {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq | CmpOp::Ne => unreachable!(),
        });
    }
    if let (Some(a), Some(b)) = (as_str(&l), as_str(&r)) {
        return Ok(match op {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq | CmpOp::Ne => unreachable!(),
        });
    }
    anyhow::bail!("cannot order-compare {l:?} and {r:?}")
}

fn call_helper(name: &str, args: &[Value]) -> anyhow::Result<Value> {
    match name {
        "file_exists" => {
            let path = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("file_exists expects a path string"))?;
            Ok(Value::Bool(Path::new(path).exists()))
        }
        "all_files_exist" => {
            let paths = args
                .first()
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow::anyhow!("all_files_exist expects a list of paths"))?;
            let all = paths
                .iter()
                .all(|p| p.as_str().map(|s| Path::new(s).exists()).unwrap_or(false));
            Ok(Value::Bool(all))
        }
        "file_is_newer" => {
            let a = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("file_is_newer expects two path strings"))?;
            let b = args
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("file_is_newer expects two path strings"))?;
            let mtime = |p: &str| -> anyhow::Result<std::time::SystemTime> {
                Ok(std::fs::metadata(p)?.modified()?)
            };
            Ok(Value::Bool(mtime(a)? > mtime(b)?))
        }
        "and" => Ok(Value::Bool(args.iter().all(truthy))),
        "or" => Ok(Value::Bool(args.iter().any(truthy))),
        "not" => {
            let arg = args
                .first()
                .ok_or_else(|| anyhow::anyhow!("not() expects exactly one argument"))?;
            Ok(Value::Bool(!truthy(arg)))
        }
        other => anyhow::bail!("function '{other}' is not in the allow-list"),
    }
}

fn eval(expr: &Expr, context: &Context) -> anyhow::Result<Value> {
    Ok(match expr {
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Number(n) => serde_json::json!(n),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Ident(name) => resolve_ident(name, context),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, context)?)),
        Expr::And(l, r) => Value::Bool(truthy(&eval(l, context)?) && truthy(&eval(r, context)?)),
        Expr::Or(l, r) => Value::Bool(truthy(&eval(l, context)?) || truthy(&eval(r, context)?)),
        Expr::Cmp(op, l, r) => {
            Value::Bool(compare(op, eval(l, context)?, eval(r, context)?)?)
        }
        Expr::Arith(op, l, r) => arith(op, eval(l, context)?, eval(r, context)?)?,
        Expr::Neg(inner) => {
            let v = eval(inner, context)?;
            let n = as_f64(&v).ok_or_else(|| anyhow::anyhow!("'{v:?}' is not numeric"))?;
            serde_json::json!(-n)
        }
        Expr::Call(name, arg_exprs) => {
            let args = arg_exprs
                .iter()
                .map(|a| eval(a, context))
                .collect::<anyhow::Result<Vec<_>>>()?;
            call_helper(name, &args)?
        }
    })
}

/// Parse and evaluate a restricted boolean expression, returning its
/// truthy-coerced result.
pub fn evaluate(text: &str, context: &Context) -> anyhow::Result<bool> {
    let expr = parse(text)?;
    let value = eval(&expr, context)?;
    Ok(truthy(&value))
}
