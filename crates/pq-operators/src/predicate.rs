//! Predicate evaluation for `FilterRows` (§4.2).

use pq_common::{CompareOp, Comparison, ITable, PqError, Predicate, Table, Value};

pub fn eval_predicate(table: &Table, row: usize, pred: &Predicate) -> Result<bool, PqError> {
    match pred {
        Predicate::Comparison(c) => eval_comparison(table, row, c),
        Predicate::And(parts) => {
            for p in parts {
                if !eval_predicate(table, row, p)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(parts) => {
            for p in parts {
                if eval_predicate(table, row, p)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not(p) => Ok(!eval_predicate(table, row, p)?),
    }
}

fn eval_comparison(table: &Table, row: usize, c: &Comparison) -> Result<bool, PqError> {
    let col = table.column_index(&c.column)?;
    let cell = table.cell(row, col);
    if matches!(c.op, CompareOp::IsNull) {
        return Ok(cell.is_null());
    }
    if matches!(c.op, CompareOp::IsNotNull) {
        return Ok(!cell.is_null());
    }
    let rhs = c
        .value
        .as_ref()
        .ok_or_else(|| PqError::InvalidArgument(format!("comparison on {} needs a value", c.column)))?;

    let case_sensitive = c.case_sensitive.unwrap_or(true);
    match c.op {
        CompareOp::Equals => Ok(compare_eq(&cell, rhs, case_sensitive)),
        CompareOp::NotEquals => Ok(!compare_eq(&cell, rhs, case_sensitive)),
        CompareOp::Lt => Ok(matches!(cell.partial_cmp(rhs), Some(std::cmp::Ordering::Less))),
        CompareOp::Le => Ok(matches!(
            cell.partial_cmp(rhs),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        )),
        CompareOp::Gt => Ok(matches!(cell.partial_cmp(rhs), Some(std::cmp::Ordering::Greater))),
        CompareOp::Ge => Ok(matches!(
            cell.partial_cmp(rhs),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        )),
        CompareOp::Contains => Ok(text_match(&cell, rhs, case_sensitive, |h, n| h.contains(n))),
        CompareOp::StartsWith => Ok(text_match(&cell, rhs, case_sensitive, |h, n| h.starts_with(n))),
        CompareOp::EndsWith => Ok(text_match(&cell, rhs, case_sensitive, |h, n| h.ends_with(n))),
        CompareOp::IsNull | CompareOp::IsNotNull => unreachable!(),
    }
}

fn compare_eq(a: &Value, b: &Value, case_sensitive: bool) -> bool {
    if case_sensitive {
        a.key_eq(b)
    } else {
        a.value_key_ci() == b.value_key_ci()
    }
}

fn text_match(cell: &Value, needle: &Value, case_sensitive: bool, f: impl Fn(&str, &str) -> bool) -> bool {
    let (Some(h), Some(n)) = (cell.as_text(), needle.as_text()) else {
        return false;
    };
    if case_sensitive {
        f(h, n)
    } else {
        f(&h.to_lowercase(), &n.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, DataType};

    fn sample() -> Table {
        Table::new(
            vec![Column::new("name", DataType::Text), Column::new("age", DataType::Number)],
            vec![
                vec![Value::Text("Ada".into()), Value::Int(30)],
                vec![Value::Text("Bob".into()), Value::Int(12)],
                vec![Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn equals_is_case_sensitive_by_default() {
        let t = sample();
        let p = Predicate::Comparison(Comparison {
            column: "name".into(),
            op: CompareOp::Equals,
            value: Some(Value::Text("ada".into())),
            case_sensitive: None,
        });
        assert!(!eval_predicate(&t, 0, &p).unwrap());
    }

    #[test]
    fn is_null_matches_null_cells() {
        let t = sample();
        let p = Predicate::Comparison(Comparison {
            column: "name".into(),
            op: CompareOp::IsNull,
            value: None,
            case_sensitive: None,
        });
        assert!(eval_predicate(&t, 2, &p).unwrap());
        assert!(!eval_predicate(&t, 0, &p).unwrap());
    }

    #[test]
    fn and_short_circuits_over_all_parts() {
        let t = sample();
        let p = Predicate::And(vec![
            Predicate::Comparison(Comparison {
                column: "age".into(),
                op: CompareOp::Gt,
                value: Some(Value::Int(10)),
                case_sensitive: None,
            }),
            Predicate::Comparison(Comparison {
                column: "age".into(),
                op: CompareOp::Lt,
                value: Some(Value::Int(20)),
                case_sensitive: None,
            }),
        ]);
        assert!(eval_predicate(&t, 1, &p).unwrap());
        assert!(!eval_predicate(&t, 0, &p).unwrap());
    }
}
