//! A tiny sandboxed per-row expression language for `add_column` and
//! `transform_columns` (§4.2). Supports `[Column]` references, a small
//! stdlib (`Text.*`, `Number.*`, `Date.*`), arithmetic, comparisons, and
//! string concatenation (`&`). Anything that fails to parse or evaluate
//! becomes an in-cell error sentinel rather than aborting the pipeline
//! (§7 propagation policy) — callers decide that translation, this module
//! only returns `Result<Value, FormulaError>`.

use pq_common::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct FormulaError(pub String);

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    ColumnRef(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Op(String),
    Underscore,
}

fn tokenize(src: &str) -> Result<Vec<Token>, FormulaError> {
    let mut chars = src.chars().peekable();
    let mut out = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                    name.push(c2);
                }
                out.push(Token::ColumnRef(name));
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                for c2 in chars.by_ref() {
                    if c2 == '"' {
                        break;
                    }
                    s.push(c2);
                }
                out.push(Token::Str(s));
            }
            '(' => {
                chars.next();
                out.push(Token::LParen);
            }
            ')' => {
                chars.next();
                out.push(Token::RParen);
            }
            ',' => {
                chars.next();
                out.push(Token::Comma);
            }
            '.' => {
                chars.next();
                out.push(Token::Dot);
            }
            '&' | '+' | '-' | '*' | '/' => {
                chars.next();
                out.push(Token::Op(c.to_string()));
            }
            '=' => {
                chars.next();
                out.push(Token::Op("=".to_string()));
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    out.push(Token::Op("<>".to_string()));
                } else if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Token::Op("<=".to_string()));
                } else {
                    out.push(Token::Op("<".to_string()));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Token::Op(">=".to_string()));
                } else {
                    out.push(Token::Op(">".to_string()));
                }
            }
            '_' if matches!(peek_ahead(&mut chars.clone()), None) => {
                chars.next();
                out.push(Token::Underscore);
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&c2) = chars.peek() {
                    if c2.is_ascii_digit() || c2 == '.' {
                        s.push(c2);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Token::Number(s.parse().map_err(|_| {
                    FormulaError(format!("invalid number literal '{s}'"))
                })?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c2) = chars.peek() {
                    if c2.is_alphanumeric() || c2 == '_' {
                        s.push(c2);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if s == "_" {
                    out.push(Token::Underscore);
                } else {
                    out.push(Token::Ident(s));
                }
            }
            other => return Err(FormulaError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(out)
}

fn peek_ahead(_iter: &mut std::iter::Peekable<std::str::Chars>) -> Option<char> {
    None
}

#[derive(Debug, Clone)]
enum Expr {
    ColumnRef(String),
    Underscore,
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Call(String, Vec<Expr>),
    BinOp(String, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }
    fn expect_op(&mut self, op: &str) -> Result<(), FormulaError> {
        match self.next() {
            Some(Token::Op(o)) if o == op => Ok(()),
            other => Err(FormulaError(format!("expected '{op}', got {other:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        self.parse_binop(0)
    }

    fn parse_binop(&mut self, min_prec: u8) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(o)) => o.clone(),
                _ => break,
            };
            let prec = precedence(&op);
            if prec < min_prec {
                break;
            }
            self.next();
            let rhs = self.parse_binop(prec + 1)?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Op(o)) = self.peek() {
            if o == "-" {
                self.next();
                return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::ColumnRef(name)) => Ok(Expr::ColumnRef(name)),
            Some(Token::Underscore) => Ok(Expr::Underscore),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(e),
                    other => Err(FormulaError(format!("expected ')', got {other:?}"))),
                }
            }
            Some(Token::Ident(name)) => {
                if name == "true" {
                    return Ok(Expr::Bool(true));
                }
                if name == "false" {
                    return Ok(Expr::Bool(false));
                }
                if name == "null" {
                    return Ok(Expr::Null);
                }
                // Namespaced call: Ident.Ident(args)
                let mut full = name;
                while let Some(Token::Dot) = self.peek() {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(part)) => {
                            full.push('.');
                            full.push_str(&part);
                        }
                        other => {
                            return Err(FormulaError(format!(
                                "expected identifier after '.', got {other:?}"
                            )))
                        }
                    }
                }
                self.expect_op_or_lparen()?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.next();
                            }
                            _ => break,
                        }
                    }
                }
                match self.next() {
                    Some(Token::RParen) => Ok(Expr::Call(full, args)),
                    other => Err(FormulaError(format!("expected ')', got {other:?}"))),
                }
            }
            other => Err(FormulaError(format!("unexpected token {other:?}"))),
        }
    }

    fn expect_op_or_lparen(&mut self) -> Result<(), FormulaError> {
        match self.next() {
            Some(Token::LParen) => Ok(()),
            other => Err(FormulaError(format!("expected '(', got {other:?}"))),
        }
    }
}

fn precedence(op: &str) -> u8 {
    match op {
        "=" | "<>" | "<" | "<=" | ">" | ">=" => 1,
        "&" => 2,
        "+" | "-" => 3,
        "*" | "/" => 4,
        _ => 0,
    }
}

/// A compiled formula, ready to evaluate against many rows.
pub struct Formula {
    expr: Expr,
}

pub fn compile(src: &str) -> Result<Formula, FormulaError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(FormulaError("trailing tokens after expression".to_string()));
    }
    Ok(Formula { expr })
}

impl Formula {
    /// Evaluate against a row. `resolve` maps a column name to its value;
    /// `current` is the value bound to `_` for `transform_columns`.
    pub fn eval(
        &self,
        resolve: &dyn Fn(&str) -> Option<Value>,
        current: Option<&Value>,
    ) -> Result<Value, FormulaError> {
        eval_expr(&self.expr, resolve, current)
    }
}

fn eval_expr(
    expr: &Expr,
    resolve: &dyn Fn(&str) -> Option<Value>,
    current: Option<&Value>,
) -> Result<Value, FormulaError> {
    match expr {
        Expr::ColumnRef(name) => resolve(name)
            .ok_or_else(|| FormulaError(format!("unknown column reference [{name}]"))),
        Expr::Underscore => current
            .cloned()
            .ok_or_else(|| FormulaError("'_' is not bound in this context".to_string())),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Text(s.clone())),
        Expr::Bool(b) => Ok(Value::Boolean(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Neg(e) => {
            let v = eval_expr(e, resolve, current)?;
            let n = v
                .as_f64()
                .ok_or_else(|| FormulaError("cannot negate a non-numeric value".to_string()))?;
            Ok(Value::Number(-n))
        }
        Expr::BinOp(op, lhs, rhs) => {
            let l = eval_expr(lhs, resolve, current)?;
            let r = eval_expr(rhs, resolve, current)?;
            eval_binop(op, &l, &r)
        }
        Expr::Call(name, args) => {
            let vals: Result<Vec<Value>, FormulaError> =
                args.iter().map(|a| eval_expr(a, resolve, current)).collect();
            eval_call(name, &vals?)
        }
    }
}

fn eval_binop(op: &str, l: &Value, r: &Value) -> Result<Value, FormulaError> {
    match op {
        "&" => Ok(Value::Text(format!("{}{}", l.stringify(), r.stringify()))),
        "=" => Ok(Value::Boolean(l.key_eq(r))),
        "<>" => Ok(Value::Boolean(!l.key_eq(r))),
        "<" | "<=" | ">" | ">=" => {
            let ord = l
                .partial_cmp(r)
                .ok_or_else(|| FormulaError("values are not comparable".to_string()))?;
            let b = match op {
                "<" => ord.is_lt(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                ">=" => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Boolean(b))
        }
        "+" | "-" | "*" | "/" => {
            let a = l
                .as_f64()
                .ok_or_else(|| FormulaError("left operand is not numeric".to_string()))?;
            let b = r
                .as_f64()
                .ok_or_else(|| FormulaError("right operand is not numeric".to_string()))?;
            let out = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => {
                    if b == 0.0 {
                        return Err(FormulaError("division by zero".to_string()));
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            Ok(Value::Number(out))
        }
        _ => Err(FormulaError(format!("unsupported operator '{op}'"))),
    }
}

fn eval_call(name: &str, args: &[Value]) -> Result<Value, FormulaError> {
    let arg_text = |i: usize| -> Result<String, FormulaError> {
        args.get(i)
            .map(|v| v.stringify())
            .ok_or_else(|| FormulaError(format!("{name} expects at least {} argument(s)", i + 1)))
    };
    let arg_num = |i: usize| -> Result<f64, FormulaError> {
        args.get(i)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| FormulaError(format!("{name} argument {} must be numeric", i + 1)))
    };
    match name {
        "Text.Upper" => Ok(Value::Text(arg_text(0)?.to_uppercase())),
        "Text.Lower" => Ok(Value::Text(arg_text(0)?.to_lowercase())),
        "Text.Trim" => Ok(Value::Text(arg_text(0)?.trim().to_string())),
        "Text.Length" => Ok(Value::Int(arg_text(0)?.chars().count() as i64)),
        "Text.Start" => {
            let s = arg_text(0)?;
            let n = arg_num(1)? as usize;
            Ok(Value::Text(s.chars().take(n).collect()))
        }
        "Text.End" => {
            let s = arg_text(0)?;
            let n = arg_num(1)? as usize;
            let total = s.chars().count();
            let skip = total.saturating_sub(n);
            Ok(Value::Text(s.chars().skip(skip).collect()))
        }
        "Text.Combine" => {
            let parts: Vec<String> = args.iter().map(|v| v.stringify()).collect();
            Ok(Value::Text(parts.join("")))
        }
        "Number.Round" => {
            let n = arg_num(0)?;
            let digits = args.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0) as i32;
            let factor = 10f64.powi(digits);
            Ok(Value::Number((n * factor).round() / factor))
        }
        "Number.Abs" => Ok(Value::Number(arg_num(0)?.abs())),
        "Number.Sqrt" => {
            let n = arg_num(0)?;
            if n < 0.0 {
                return Err(FormulaError("Number.Sqrt of a negative value".to_string()));
            }
            Ok(Value::Number(n.sqrt()))
        }
        "Date.AddDays" => {
            let d = args
                .first()
                .ok_or_else(|| FormulaError("Date.AddDays expects a date".to_string()))?;
            let days = arg_num(1)? as i64;
            match d {
                Value::Date(nd) => Ok(Value::Date(*nd + chrono::Duration::days(days))),
                Value::DateTime(dt) => Ok(Value::DateTime(*dt + chrono::Duration::days(days))),
                _ => Err(FormulaError("Date.AddDays expects a date/datetime".to_string())),
            }
        }
        "Date.Year" => match args.first() {
            Some(Value::Date(d)) => Ok(Value::Int(chrono::Datelike::year(d) as i64)),
            Some(Value::DateTime(dt)) => Ok(Value::Int(chrono::Datelike::year(&dt.date()) as i64)),
            _ => Err(FormulaError("Date.Year expects a date/datetime".to_string())),
        },
        other => Err(FormulaError(format!("unknown function '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_from(pairs: &[(&str, Value)]) -> impl Fn(&str) -> Option<Value> + '_ {
        move |name| pairs.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone())
    }

    #[test]
    fn evaluates_column_arithmetic() {
        let f = compile("[A] + [B] * 2").unwrap();
        let resolve = resolve_from(&[("A", Value::Number(1.0)), ("B", Value::Number(3.0))]);
        assert_eq!(f.eval(&resolve, None).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn evaluates_text_concat() {
        let f = compile(r#"[First] & " " & [Last]"#).unwrap();
        let resolve = resolve_from(&[
            ("First", Value::Text("Ada".into())),
            ("Last", Value::Text("Lovelace".into())),
        ]);
        assert_eq!(
            f.eval(&resolve, None).unwrap(),
            Value::Text("Ada Lovelace".into())
        );
    }

    #[test]
    fn evaluates_stdlib_call() {
        let f = compile("Text.Upper([Name])").unwrap();
        let resolve = resolve_from(&[("Name", Value::Text("ada".into()))]);
        assert_eq!(f.eval(&resolve, None).unwrap(), Value::Text("ADA".into()));
    }

    #[test]
    fn transform_columns_binds_underscore() {
        let f = compile("Number.Round(_, 0)").unwrap();
        let resolve = resolve_from(&[]);
        let cur = Value::Number(2.6);
        assert_eq!(f.eval(&resolve, Some(&cur)).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn division_by_zero_is_a_formula_error_not_a_panic() {
        let f = compile("[A] / [B]").unwrap();
        let resolve = resolve_from(&[("A", Value::Number(1.0)), ("B", Value::Number(0.0))]);
        assert!(f.eval(&resolve, None).is_err());
    }
}
