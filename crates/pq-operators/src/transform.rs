//! Value- and column-shaping operators that round out §4.2: `AddColumn`,
//! `AddIndexColumn`, `CombineColumns`, `SplitColumn`, `TransformColumns`,
//! `TransformColumnNames`, `FillDown`, `ReplaceValues`, `ReplaceErrorValues`.

use pq_common::{Column, ColumnTransform, DataType, ErrorValue, ITable, NameCaseOp, PqError, Table, Value};

use crate::formula;

pub fn add_column(table: &Table, name: &str, formula_src: &str) -> Result<Table, PqError> {
    let compiled = formula::compile(formula_src)
        .map_err(|e| PqError::InvalidArgument(format!("add column '{name}': {e}")))?;
    let mut columns = table.columns().to_vec();
    columns.push(Column::any(name));
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|mut row| {
            let resolve = |col: &str| {
                table
                    .columns()
                    .iter()
                    .position(|c| c.name == col)
                    .map(|i| row[i].clone())
            };
            let v = match compiled.eval(&resolve, None) {
                Ok(v) => v,
                Err(e) => Value::Error(ErrorValue::new(e.to_string())),
            };
            row.push(v);
            row
        })
        .collect();
    Ok(Table::new_uniquifying(columns, rows))
}

pub fn add_index_column(table: &Table, name: &str, initial: i64, increment: i64) -> Result<Table, PqError> {
    let mut columns = table.columns().to_vec();
    columns.push(Column::new(name, DataType::Number));
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .enumerate()
        .map(|(i, mut row)| {
            row.push(Value::Int(initial + increment * i as i64));
            row
        })
        .collect();
    Ok(Table::new_uniquifying(columns, rows))
}

pub fn combine_columns(table: &Table, columns_in: &[String], delimiter: &str, new_name: &str) -> Result<Table, PqError> {
    let idx: Vec<usize> = columns_in.iter().map(|c| table.column_index(c)).collect::<Result<_, _>>()?;
    let keep: Vec<usize> = (0..table.column_count()).filter(|i| !idx.contains(i)).collect();
    let mut columns: Vec<Column> = keep.iter().map(|&i| table.columns()[i].clone()).collect();
    columns.push(Column::any(new_name));
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|row| {
            let mut out: Vec<Value> = keep.iter().map(|&i| row[i].clone()).collect();
            let combined = idx.iter().map(|&i| row[i].stringify()).collect::<Vec<_>>().join(delimiter);
            out.push(Value::Text(combined));
            out
        })
        .collect();
    Ok(Table::new_uniquifying(columns, rows))
}

pub fn split_column(
    table: &Table,
    column: &str,
    delimiter: &str,
    new_columns: Option<&[String]>,
) -> Result<Table, PqError> {
    let idx = table.column_index(column)?;
    let parts_per_row: Vec<Vec<String>> = table
        .iter_rows()
        .map(|row| row[idx].stringify().split(delimiter).map(|s| s.to_string()).collect())
        .collect();
    let width = parts_per_row.iter().map(|p| p.len()).max().unwrap_or(1);

    let names: Vec<String> = match new_columns {
        Some(names) => names.to_vec(),
        None => (1..=width).map(|i| format!("{column}.{i}")).collect(),
    };
    let names = pq_common::make_unique_column_names(&names);

    let mut columns = Vec::with_capacity(table.column_count() - 1 + names.len());
    for (i, c) in table.columns().iter().enumerate() {
        if i == idx {
            for n in &names {
                columns.push(Column::any(n.clone()));
            }
        } else {
            columns.push(c.clone());
        }
    }

    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .zip(parts_per_row)
        .map(|(row, parts)| {
            let mut out = Vec::with_capacity(columns.len());
            for (i, v) in row.into_iter().enumerate() {
                if i == idx {
                    for slot in 0..names.len() {
                        out.push(parts.get(slot).map(|s| Value::Text(s.clone())).unwrap_or(Value::Null));
                    }
                } else {
                    out.push(v);
                }
            }
            out
        })
        .collect();
    Table::new(columns, rows)
}

pub fn transform_columns(table: &Table, transforms: &[ColumnTransform]) -> Result<Table, PqError> {
    let mut compiled = Vec::with_capacity(transforms.len());
    for t in transforms {
        let idx = table.column_index(&t.column)?;
        let f = formula::compile(&t.formula)
            .map_err(|e| PqError::InvalidArgument(format!("transform column '{}': {e}", t.column)))?;
        compiled.push((idx, f, t.retype));
    }
    let mut columns = table.columns().to_vec();
    for (idx, _, retype) in &compiled {
        if let Some(dt) = retype {
            columns[*idx].data_type = *dt;
        }
    }
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|mut row| {
            for (idx, f, _) in &compiled {
                let current = row[*idx].clone();
                let resolve = |_: &str| None;
                row[*idx] = match f.eval(&resolve, Some(&current)) {
                    Ok(v) => v,
                    Err(e) => Value::Error(ErrorValue::new(e.to_string())),
                };
            }
            row
        })
        .collect();
    Table::new(columns, rows)
}

pub fn transform_column_names(table: &Table, op: NameCaseOp) -> Result<Table, PqError> {
    let names: Vec<String> = table
        .columns()
        .iter()
        .map(|c| match op {
            NameCaseOp::Upper => c.name.to_uppercase(),
            NameCaseOp::Lower => c.name.to_lowercase(),
            NameCaseOp::Trim => c.name.trim().to_string(),
        })
        .collect();
    let names = pq_common::make_unique_column_names(&names);
    let columns: Vec<Column> = names
        .into_iter()
        .zip(table.columns())
        .map(|(name, c)| Column::new(name, c.data_type))
        .collect();
    Table::new(columns, table.iter_rows().collect())
}

/// Carries the last non-null value in each named column forward into
/// subsequent nulls, top to bottom.
pub fn fill_down(table: &Table, columns: &[String]) -> Result<Table, PqError> {
    let idx: Vec<usize> = columns.iter().map(|c| table.column_index(c)).collect::<Result<_, _>>()?;
    let mut rows: Vec<Vec<Value>> = table.iter_rows().collect();
    for &i in &idx {
        let mut last: Option<Value> = None;
        for row in rows.iter_mut() {
            if row[i].is_null() {
                if let Some(v) = &last {
                    row[i] = v.clone();
                }
            } else {
                last = Some(row[i].clone());
            }
        }
    }
    Table::new(table.columns().to_vec(), rows)
}

pub fn replace_values(table: &Table, column: &str, find: &Value, replace: &Value) -> Result<Table, PqError> {
    let idx = table.column_index(column)?;
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|mut row| {
            if row[idx].key_eq(find) {
                row[idx] = replace.clone();
            }
            row
        })
        .collect();
    Table::new(table.columns().to_vec(), rows)
}

pub fn replace_error_values(table: &Table, replacements: &[(String, Value)]) -> Result<Table, PqError> {
    let idx: Vec<(usize, &Value)> = replacements
        .iter()
        .map(|(c, v)| Ok((table.column_index(c)?, v)))
        .collect::<Result<_, PqError>>()?;
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|mut row| {
            for (i, v) in &idx {
                if row[*i].is_error() {
                    row[*i] = (*v).clone();
                }
            }
            row
        })
        .collect();
    Table::new(table.columns().to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec![Column::any("a"), Column::any("b")],
            vec![vec![Value::Number(1.0), Value::Text("x".into())], vec![Value::Number(2.0), Value::Text("y".into())]],
        )
        .unwrap()
    }

    #[test]
    fn add_column_evaluates_formula_per_row() {
        let out = add_column(&sample(), "doubled", "[a] * 2").unwrap();
        assert_eq!(out.cell(0, 2), Value::Number(2.0));
        assert_eq!(out.cell(1, 2), Value::Number(4.0));
    }

    #[test]
    fn add_index_column_increments_from_initial() {
        let out = add_index_column(&sample(), "idx", 1, 1).unwrap();
        assert_eq!(out.cell(0, 2), Value::Int(1));
        assert_eq!(out.cell(1, 2), Value::Int(2));
    }

    #[test]
    fn split_column_pads_short_parts_with_null() {
        let t = Table::new(vec![Column::any("full")], vec![vec![Value::Text("a-b".into())], vec![Value::Text("a".into())]]).unwrap();
        let out = split_column(&t, "full", "-", None).unwrap();
        assert_eq!(out.column_count(), 2);
        assert_eq!(out.cell(1, 1), Value::Null);
    }

    #[test]
    fn fill_down_carries_last_seen_value() {
        let t = Table::new(
            vec![Column::any("a")],
            vec![vec![Value::Int(1)], vec![Value::Null], vec![Value::Null], vec![Value::Int(2)]],
        )
        .unwrap();
        let out = fill_down(&t, &["a".to_string()]).unwrap();
        let vals: Vec<_> = out.iter_rows().map(|r| r[0].clone()).collect();
        assert_eq!(vals, vec![Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn replace_error_values_only_touches_error_cells() {
        let t = Table::new(
            vec![Column::any("a")],
            vec![vec![Value::Error(ErrorValue::new("boom"))], vec![Value::Int(5)]],
        )
        .unwrap();
        let out = replace_error_values(&t, &[("a".to_string(), Value::Int(0))]).unwrap();
        assert_eq!(out.cell(0, 0), Value::Int(0));
        assert_eq!(out.cell(1, 0), Value::Int(5));
    }
}
