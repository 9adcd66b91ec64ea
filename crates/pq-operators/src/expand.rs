//! `ExpandTableColumn` (§4.2): inlines the nested tables a `nested`-mode
//! merge produced. A row whose nested value is absent or empty still
//! contributes one output row (nested slots become null) so expansion
//! never silently drops outer rows.

use pq_common::{Column, ITable, PqError, Table, Value};

pub fn expand_table_column(
    table: &Table,
    column: &str,
    columns: Option<&[String]>,
    new_column_names: Option<&[String]>,
) -> Result<Table, PqError> {
    let idx = table.column_index(column)?;

    let nested_names: Vec<String> = match columns {
        Some(c) => c.to_vec(),
        None => table
            .iter_rows()
            .find_map(|row| match &row[idx] {
                Value::Table(t) => Some(t.columns().iter().map(|c| c.name.clone()).collect()),
                _ => None,
            })
            .unwrap_or_default(),
    };

    if let Some(new_names) = new_column_names {
        if new_names.len() != nested_names.len() {
            return Err(PqError::InvalidArgument(format!(
                "newColumnNames has {} entries but {} nested columns were expanded",
                new_names.len(),
                nested_names.len()
            )));
        }
    }
    let out_nested_names: Vec<String> = new_column_names.map(|n| n.to_vec()).unwrap_or_else(|| nested_names.clone());

    let keep: Vec<usize> = (0..table.column_count()).filter(|&i| i != idx).collect();
    let mut raw_names: Vec<String> = keep.iter().map(|&i| table.columns()[i].name.clone()).collect();
    raw_names.extend(out_nested_names.iter().cloned());
    let unique_names = pq_common::make_unique_column_names(&raw_names);

    let mut out_columns: Vec<Column> = keep.iter().map(|&i| table.columns()[i].clone()).collect();
    out_columns.extend(out_nested_names.iter().map(Column::any));
    for (c, n) in out_columns.iter_mut().zip(unique_names) {
        c.name = n;
    }

    let mut rows = Vec::new();
    for row in table.iter_rows() {
        let outer: Vec<Value> = keep.iter().map(|&i| row[i].clone()).collect();
        match &row[idx] {
            Value::Table(nested) if nested.row_count() > 0 => {
                let nested_idx: Vec<Option<usize>> =
                    nested_names.iter().map(|n| nested.columns().iter().position(|c| &c.name == n)).collect();
                for r in 0..nested.row_count() {
                    let mut out = outer.clone();
                    out.extend(nested_idx.iter().map(|slot| match slot {
                        Some(ci) => nested.cell(r, *ci),
                        None => Value::Null,
                    }));
                    rows.push(out);
                }
            }
            _ => {
                let mut out = outer;
                out.extend(std::iter::repeat(Value::Null).take(out_nested_names.len()));
                rows.push(out);
            }
        }
    }
    Table::new(out_columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_table(rows: Vec<Vec<Value>>) -> Table {
        Table::new(vec![Column::any("Right")], rows).unwrap()
    }

    #[test]
    fn expands_matched_rows_one_per_nested_row() {
        let t = Table::new(
            vec![Column::any("Key"), Column::any("Matches")],
            vec![vec![Value::Int(1), Value::Table(nested_table(vec![vec![Value::Text("a".into())], vec![Value::Text("b".into())]]))]],
        )
        .unwrap();
        let out = expand_table_column(&t, "Matches", None, None).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(0, 1), Value::Text("a".into()));
        assert_eq!(out.cell(1, 1), Value::Text("b".into()));
    }

    #[test]
    fn empty_nested_table_still_emits_one_row_with_nulls() {
        let t = Table::new(
            vec![Column::any("Key"), Column::any("Matches")],
            vec![vec![Value::Int(1), Value::Table(nested_table(vec![]))]],
        )
        .unwrap();
        let out = expand_table_column(&t, "Matches", Some(&["Right".to_string()]), None).unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.cell(0, 1), Value::Null);
    }

    #[test]
    fn rejects_mismatched_new_column_name_length() {
        let t = Table::new(
            vec![Column::any("Key"), Column::any("Matches")],
            vec![vec![Value::Int(1), Value::Table(nested_table(vec![]))]],
        )
        .unwrap();
        let err = expand_table_column(&t, "Matches", Some(&["Right".to_string()]), Some(&["A".to_string(), "B".to_string()]));
        assert!(err.is_err());
    }
}
