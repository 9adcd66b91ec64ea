//! Renders the IR's predicate tree and a restricted arithmetic grammar
//! into SQL text with `?` placeholders (§4.6). Every value that becomes a
//! bound parameter is pushed to `params` in left-to-right textual order,
//! matching the order the dialect-specific placeholder pass later assigns
//! `$1..$n` / `@p1..@pn` to.

use pq_common::{CompareOp, Comparison, Predicate, Value};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `None` means this predicate uses a construct the restricted grammar
/// doesn't cover (there is none today — every `CompareOp`/boolean
/// combinator folds), reserved for future non-foldable comparison kinds.
pub fn render_predicate(pred: &Predicate, params: &mut Vec<Value>) -> Option<String> {
    match pred {
        Predicate::Comparison(cmp) => render_comparison(cmp, params),
        Predicate::And(preds) => {
            if preds.is_empty() {
                return Some("1=1".to_string());
            }
            let parts: Option<Vec<String>> = preds.iter().map(|p| render_predicate(p, params)).collect();
            Some(format!("({})", parts?.join(" AND ")))
        }
        Predicate::Or(preds) => {
            if preds.is_empty() {
                return Some("1=0".to_string());
            }
            let parts: Option<Vec<String>> = preds.iter().map(|p| render_predicate(p, params)).collect();
            Some(format!("({})", parts?.join(" OR ")))
        }
        Predicate::Not(inner) => Some(format!("NOT ({})", render_predicate(inner, params)?)),
    }
}

fn render_comparison(cmp: &Comparison, params: &mut Vec<Value>) -> Option<String> {
    let col = quote_ident(&cmp.column);
    let case_insensitive = cmp.case_sensitive == Some(false);
    let lhs = if case_insensitive { format!("LOWER({col})") } else { col.clone() };

    Some(match cmp.op {
        CompareOp::Equals => {
            params.push(bind(cmp.value.clone()?, case_insensitive));
            format!("{lhs} = ?")
        }
        CompareOp::NotEquals => {
            params.push(bind(cmp.value.clone()?, case_insensitive));
            format!("{lhs} <> ?")
        }
        CompareOp::Lt => {
            params.push(cmp.value.clone()?);
            format!("{col} < ?")
        }
        CompareOp::Le => {
            params.push(cmp.value.clone()?);
            format!("{col} <= ?")
        }
        CompareOp::Gt => {
            params.push(cmp.value.clone()?);
            format!("{col} > ?")
        }
        CompareOp::Ge => {
            params.push(cmp.value.clone()?);
            format!("{col} >= ?")
        }
        CompareOp::Contains => {
            params.push(bind(wrap_like(cmp.value.as_ref()?, true, true), case_insensitive));
            format!("{lhs} LIKE ?")
        }
        CompareOp::StartsWith => {
            params.push(bind(wrap_like(cmp.value.as_ref()?, false, true), case_insensitive));
            format!("{lhs} LIKE ?")
        }
        CompareOp::EndsWith => {
            params.push(bind(wrap_like(cmp.value.as_ref()?, true, false), case_insensitive));
            format!("{lhs} LIKE ?")
        }
        CompareOp::IsNull => format!("{col} IS NULL"),
        CompareOp::IsNotNull => format!("{col} IS NOT NULL"),
    })
}

fn wrap_like(v: &Value, leading: bool, trailing: bool) -> Value {
    let s = v.stringify();
    Value::Text(format!("{}{}{}", if leading { "%" } else { "" }, s, if trailing { "%" } else { "" }))
}

fn bind(v: Value, lower: bool) -> Value {
    if lower {
        if let Value::Text(s) = &v {
            return Value::Text(s.to_lowercase());
        }
    }
    v
}

/// A small recursive-descent parser over `add_column`'s restricted
/// arithmetic grammar: `[Column]` references, numeric literals, and
/// `+ - * /` with standard precedence and parens. Anything richer
/// (function calls, text concatenation, conditionals) returns `None`,
/// which the fold loop treats as "stop folding here".
pub fn render_arithmetic(formula: &str) -> Option<String> {
    let tokens = tokenize(formula)?;
    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return None;
    }
    Some(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Column(String),
    Number(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(s: &str) -> Option<Vec<Tok>> {
    let mut out = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '[' => {
                let end = chars[i..].iter().position(|&c| c == ']')? + i;
                let name: String = chars[i + 1..end].iter().collect();
                out.push(Tok::Column(name));
                i = end + 1;
            }
            '+' | '-' | '*' | '/' => {
                out.push(Tok::Op(c));
                i += 1;
            }
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                out.push(Tok::Number(chars[start..i].iter().collect()));
            }
            _ => return None,
        }
    }
    Some(out)
}

fn parse_expr(tokens: &[Tok], pos: &mut usize) -> Option<String> {
    let mut lhs = parse_term(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Tok::Op(op @ ('+' | '-'))) => {
                *pos += 1;
                let rhs = parse_term(tokens, pos)?;
                lhs = format!("({lhs} {op} {rhs})");
            }
            _ => break,
        }
    }
    Some(lhs)
}

fn parse_term(tokens: &[Tok], pos: &mut usize) -> Option<String> {
    let mut lhs = parse_factor(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Tok::Op(op @ ('*' | '/'))) => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                lhs = format!("({lhs} {op} {rhs})");
            }
            _ => break,
        }
    }
    Some(lhs)
}

fn parse_factor(tokens: &[Tok], pos: &mut usize) -> Option<String> {
    match tokens.get(*pos)? {
        Tok::Column(name) => {
            *pos += 1;
            Some(quote_ident(name))
        }
        Tok::Number(n) => {
            *pos += 1;
            Some(n.clone())
        }
        Tok::LParen => {
            *pos += 1;
            let inner = parse_expr(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Tok::RParen) => {
                    *pos += 1;
                    Some(format!("({inner})"))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_comparison_binds_a_parameter() {
        let mut params = Vec::new();
        let cmp = Comparison { column: "Region".into(), op: CompareOp::Equals, value: Some(Value::Text("East".into())), case_sensitive: None };
        let sql = render_comparison(&cmp, &mut params).unwrap();
        assert_eq!(sql, "\"Region\" = ?");
        assert_eq!(params, vec![Value::Text("East".into())]);
    }

    #[test]
    fn contains_wraps_value_in_wildcards() {
        let mut params = Vec::new();
        let cmp = Comparison { column: "Name".into(), op: CompareOp::Contains, value: Some(Value::Text("an".into())), case_sensitive: None };
        render_comparison(&cmp, &mut params).unwrap();
        assert_eq!(params, vec![Value::Text("%an%".into())]);
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let mut params = Vec::new();
        assert_eq!(render_predicate(&Predicate::And(vec![]), &mut params).unwrap(), "1=1");
        assert_eq!(render_predicate(&Predicate::Or(vec![]), &mut params).unwrap(), "1=0");
    }

    #[test]
    fn arithmetic_parses_column_references_with_precedence() {
        assert_eq!(render_arithmetic("[A] + [B] * 2").unwrap(), "(\"A\" + (\"B\" * 2))");
    }

    #[test]
    fn arithmetic_rejects_function_calls() {
        assert_eq!(render_arithmetic("Text.Upper([A])"), None);
    }
}
