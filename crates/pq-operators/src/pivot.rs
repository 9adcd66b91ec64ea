//! `Pivot` / `Unpivot` (§4.2).

use pq_common::{AggOp, Column, DataType, ITable, PqError, Table, Value};
use rustc_hash::FxHashMap;

/// Spreads distinct values of `row_col` into new columns, aggregating
/// `value_col` per (remaining-columns, row_col) group. Remaining columns
/// (everything except `row_col`/`value_col`) form the grouping key.
pub fn pivot(table: &Table, row_col: &str, value_col: &str, agg: AggOp) -> Result<Table, PqError> {
    let row_idx = table.column_index(row_col)?;
    let val_idx = table.column_index(value_col)?;
    let key_idx: Vec<usize> = (0..table.column_count())
        .filter(|&i| i != row_idx && i != val_idx)
        .collect();

    let mut pivot_values: Vec<String> = Vec::new();
    let mut pivot_seen = std::collections::HashSet::new();
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, Vec<Value>> = FxHashMap::default();
    let mut cells: FxHashMap<(String, String), Vec<Value>> = FxHashMap::default();

    for row in table.iter_rows() {
        let key = key_idx.iter().map(|&i| row[i].value_key()).collect::<Vec<_>>().join("\u{1}");
        if !groups.contains_key(&key) {
            group_order.push(key.clone());
            groups.insert(key.clone(), key_idx.iter().map(|&i| row[i].clone()).collect());
        }
        let pivot_key = row[row_idx].stringify();
        if pivot_seen.insert(pivot_key.clone()) {
            pivot_values.push(pivot_key.clone());
        }
        cells.entry((key, pivot_key)).or_default().push(row[val_idx].clone());
    }

    let mut columns: Vec<Column> = key_idx.iter().map(|&i| table.columns()[i].clone()).collect();
    for pv in &pivot_values {
        columns.push(Column::new(pv.clone(), data_type_for(agg, table.columns()[val_idx].data_type)));
    }
    let columns = {
        let names = pq_common::make_unique_column_names(&columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
        columns.into_iter().zip(names).map(|(c, n)| Column { name: n, ..c }).collect::<Vec<_>>()
    };

    let rows: Vec<Vec<Value>> = group_order
        .into_iter()
        .map(|key| {
            let mut row = groups[&key].clone();
            for pv in &pivot_values {
                let bucket = cells.get(&(key.clone(), pv.clone()));
                row.push(match bucket {
                    Some(vals) => reduce(agg, vals),
                    None => Value::Null,
                });
            }
            row
        })
        .collect();
    Table::new(columns, rows)
}

fn data_type_for(agg: AggOp, value_col_type: DataType) -> DataType {
    match agg {
        AggOp::Count | AggOp::CountDistinct => DataType::Number,
        _ => value_col_type,
    }
}

fn reduce(agg: AggOp, vals: &[Value]) -> Value {
    match agg {
        AggOp::Count => Value::Int(vals.len() as i64),
        AggOp::CountDistinct => {
            let set: std::collections::HashSet<String> = vals.iter().map(|v| v.value_key()).collect();
            Value::Int(set.len() as i64)
        }
        AggOp::Sum => Value::Number(vals.iter().filter_map(|v| v.as_f64()).sum()),
        AggOp::Average => {
            let nums: Vec<f64> = vals.iter().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggOp::Min => vals
            .iter()
            .filter(|v| !v.is_null())
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
            .unwrap_or(Value::Null),
        AggOp::Max => vals
            .iter()
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// Gathers a set of value columns into two columns: an attribute-name
/// column and a value column, one output row per (input row, gathered
/// column) pair. The complement of `pivot`.
pub fn unpivot(table: &Table, columns_in: &[String], name_col: &str, value_col: &str) -> Result<Table, PqError> {
    let idx: Vec<usize> = columns_in.iter().map(|c| table.column_index(c)).collect::<Result<_, _>>()?;
    let keep: Vec<usize> = (0..table.column_count()).filter(|i| !idx.contains(i)).collect();

    let mut columns: Vec<Column> = keep.iter().map(|&i| table.columns()[i].clone()).collect();
    columns.push(Column::any(name_col));
    columns.push(Column::any(value_col));
    let names = pq_common::make_unique_column_names(&columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
    let columns: Vec<Column> = columns.into_iter().zip(names).map(|(c, n)| Column { name: n, ..c }).collect();

    let mut rows = Vec::new();
    for row in table.iter_rows() {
        for &i in &idx {
            let mut out: Vec<Value> = keep.iter().map(|&k| row[k].clone()).collect();
            out.push(Value::Text(table.columns()[i].name.clone()));
            out.push(row[i].clone());
            rows.push(out);
        }
    }
    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec![Column::any("region"), Column::any("quarter"), Column::any("amount")],
            vec![
                vec![Value::Text("east".into()), Value::Text("q1".into()), Value::Number(10.0)],
                vec![Value::Text("east".into()), Value::Text("q2".into()), Value::Number(20.0)],
                vec![Value::Text("west".into()), Value::Text("q1".into()), Value::Number(5.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn pivot_spreads_distinct_values_into_columns() {
        let out = pivot(&sample(), "quarter", "amount", AggOp::Sum).unwrap();
        assert_eq!(out.column_count(), 3); // region, q1, q2
        assert_eq!(out.cell(0, 0), Value::Text("east".into()));
        let west = (0..out.row_count()).find(|&r| out.cell(r, 0) == Value::Text("west".into())).unwrap();
        assert_eq!(out.cell(west, 2), Value::Null);
    }

    #[test]
    fn unpivot_is_pivots_inverse_in_row_count() {
        let pivoted = pivot(&sample(), "quarter", "amount", AggOp::Sum).unwrap();
        let cols: Vec<String> = pivoted.columns()[1..].iter().map(|c| c.name.clone()).collect();
        let back = unpivot(&pivoted, &cols, "quarter", "amount").unwrap();
        assert_eq!(back.row_count(), 4); // east has both quarters, west only q1 but still produces a null row
    }
}
