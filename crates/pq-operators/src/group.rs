//! `GroupBy` (§4.2): partitions rows by key, reduces each partition with the
//! requested aggregations. Group order follows first-occurrence of the key,
//! mirroring the input's row order (stable, like `distinct_rows`).

use pq_common::{AggOp, Aggregation, Column, DataType, ITable, PqError, Table, Value};
use rustc_hash::FxHashMap;

pub fn group_by(table: &Table, keys: &[String], aggs: &[Aggregation]) -> Result<Table, PqError> {
    let key_idx: Vec<usize> = keys.iter().map(|k| table.column_index(k)).collect::<Result<_, _>>()?;
    let agg_idx: Vec<Option<usize>> = aggs
        .iter()
        .map(|a| a.column.as_deref().map(|c| table.column_index(c)).transpose())
        .collect::<Result<_, _>>()?;

    let mut order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, Vec<Vec<Value>>> = FxHashMap::default();
    for row in table.iter_rows() {
        let key = key_idx.iter().map(|&i| row[i].value_key()).collect::<Vec<_>>().join("\u{1}");
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let mut out_columns: Vec<Column> = key_idx.iter().map(|&i| table.columns()[i].clone()).collect();
    for (agg, col) in aggs.iter().zip(&agg_idx) {
        let name = agg
            .as_name
            .clone()
            .unwrap_or_else(|| default_agg_name(agg.op, col.map(|i| table.columns()[i].name.as_str())));
        let dt = match agg.op {
            AggOp::Count | AggOp::CountDistinct => DataType::Number,
            _ => col.map(|i| table.columns()[i].data_type).unwrap_or(DataType::Number),
        };
        out_columns.push(Column::new(name, dt));
    }

    let mut rows = Vec::with_capacity(order.len());
    for key in &order {
        let group = &groups[key];
        let first = &group[0];
        let mut row: Vec<Value> = key_idx.iter().map(|&i| first[i].clone()).collect();
        for (agg, col) in aggs.iter().zip(&agg_idx) {
            row.push(reduce(agg.op, *col, group));
        }
        rows.push(row);
    }
    Ok(Table::new_uniquifying(out_columns, rows))
}

pub fn default_agg_name(op: AggOp, col: Option<&str>) -> String {
    let op_name = match op {
        AggOp::Sum => "sum",
        AggOp::Count => "count",
        AggOp::Average => "average",
        AggOp::Min => "min",
        AggOp::Max => "max",
        AggOp::CountDistinct => "countDistinct",
    };
    match col {
        Some(c) => format!("{op_name} of {c}"),
        None => op_name.to_string(),
    }
}

fn reduce(op: AggOp, col: Option<usize>, rows: &[Vec<Value>]) -> Value {
    match op {
        AggOp::Count => match col {
            Some(i) => Value::Int(rows.iter().filter(|r| !r[i].is_null()).count() as i64),
            None => Value::Int(rows.len() as i64),
        },
        AggOp::CountDistinct => {
            let i = col.expect("countDistinct requires a column");
            let set: std::collections::HashSet<String> =
                rows.iter().map(|r| r[i].value_key()).collect();
            Value::Int(set.len() as i64)
        }
        AggOp::Sum => {
            let i = col.expect("sum requires a column");
            let total: f64 = rows.iter().filter_map(|r| r[i].as_f64()).sum();
            Value::Number(total)
        }
        AggOp::Average => {
            let i = col.expect("average requires a column");
            let vals: Vec<f64> = rows.iter().filter_map(|r| r[i].as_f64()).collect();
            if vals.is_empty() {
                Value::Null
            } else {
                Value::Number(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        }
        AggOp::Min => {
            let i = col.expect("min requires a column");
            rows.iter()
                .map(|r| &r[i])
                .filter(|v| !v.is_null())
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .cloned()
                .unwrap_or(Value::Null)
        }
        AggOp::Max => {
            let i = col.expect("max requires a column");
            rows.iter()
                .map(|r| &r[i])
                .filter(|v| !v.is_null())
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .cloned()
                .unwrap_or(Value::Null)
        }
    }
}
