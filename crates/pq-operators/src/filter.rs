//! Row-filtering operators (§4.2): `FilterRows`, `DistinctRows`,
//! `RemoveRowsWithErrors`.

use pq_common::{ITable, PqError, Predicate, Table, Value};
use rustc_hash::FxHashSet;

use crate::predicate::eval_predicate;

pub fn filter_rows(table: &Table, predicate: &Predicate) -> Result<Table, PqError> {
    let mut rows = Vec::new();
    for r in 0..table.row_count() {
        if eval_predicate(table, r, predicate)? {
            rows.push(table.row(r));
        }
    }
    Table::new(table.columns().to_vec(), rows)
}

/// Keeps the first row of every distinct key, stably (I3). `columns = None`
/// means the whole row is the key.
pub fn distinct_rows(table: &Table, columns: Option<&[String]>) -> Result<Table, PqError> {
    let idx: Option<Vec<usize>> = columns
        .map(|cols| cols.iter().map(|c| table.column_index(c)).collect::<Result<_, _>>())
        .transpose()?;
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut rows = Vec::new();
    for row in table.iter_rows() {
        let key = match &idx {
            Some(idx) => idx.iter().map(|&i| row[i].value_key()).collect::<Vec<_>>().join("\u{1}"),
            None => row.iter().map(|v| v.value_key()).collect::<Vec<_>>().join("\u{1}"),
        };
        if seen.insert(key) {
            rows.push(row);
        }
    }
    Table::new(table.columns().to_vec(), rows)
}

pub fn remove_rows_with_errors(table: &Table, columns: Option<&[String]>) -> Result<Table, PqError> {
    let idx: Option<Vec<usize>> = columns
        .map(|cols| cols.iter().map(|c| table.column_index(c)).collect::<Result<_, _>>())
        .transpose()?;
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .filter(|row| match &idx {
            Some(idx) => !idx.iter().any(|&i| row[i].is_error()),
            None => !row.iter().any(|v| v.is_error()),
        })
        .collect();
    Table::new(table.columns().to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, CompareOp, Comparison, ErrorValue};

    fn sample() -> Table {
        Table::new(
            vec![Column::any("a"), Column::any("b")],
            vec![
                vec![Value::Int(1), Value::Text("x".into())],
                vec![Value::Int(1), Value::Text("y".into())],
                vec![Value::Int(2), Value::Error(ErrorValue::new("boom"))],
            ],
        )
        .unwrap()
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let p = Predicate::Comparison(Comparison {
            column: "a".into(),
            op: CompareOp::Equals,
            value: Some(Value::Int(1)),
            case_sensitive: None,
        });
        let out = filter_rows(&sample(), &p).unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn distinct_on_key_columns_keeps_first_occurrence() {
        let out = distinct_rows(&sample(), Some(&["a".to_string()])).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(0, 1), Value::Text("x".into()));
    }

    #[test]
    fn remove_rows_with_errors_drops_any_error_cell() {
        let out = remove_rows_with_errors(&sample(), None).unwrap();
        assert_eq!(out.row_count(), 2);
    }
}
