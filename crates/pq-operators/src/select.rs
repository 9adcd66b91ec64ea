//! Column-shape operators: select/remove/rename/reorder/retype (§4.2).

use pq_common::{Column, DataType, ErrorValue, ITable, PqError, Table, Value};

pub fn select_columns(table: &Table, columns: &[String]) -> Result<Table, PqError> {
    let idx: Vec<usize> = columns
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<_, _>>()?;
    project(table, &idx)
}

pub fn remove_columns(table: &Table, columns: &[String]) -> Result<Table, PqError> {
    let drop: std::collections::HashSet<usize> = columns
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<_, _>>()?;
    let keep: Vec<usize> = (0..table.column_count()).filter(|i| !drop.contains(i)).collect();
    project(table, &keep)
}

fn project(table: &Table, idx: &[usize]) -> Result<Table, PqError> {
    let columns: Vec<Column> = idx.iter().map(|&i| table.columns()[i].clone()).collect();
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|row| idx.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Table::new(columns, rows)
}

pub fn rename_column(table: &Table, old: &str, new: &str) -> Result<Table, PqError> {
    let idx = table.column_index(old)?;
    if new != old && table.columns().iter().any(|c| c.name == new) {
        return Err(PqError::InvalidArgument(format!(
            "cannot rename '{old}' to '{new}': a column with that name already exists"
        )));
    }
    let mut columns = table.columns().to_vec();
    columns[idx].name = new.to_string();
    let rows: Vec<Vec<Value>> = table.iter_rows().collect();
    Table::new(columns, rows)
}

pub fn reorder_columns(
    table: &Table,
    columns: &[String],
    missing: pq_common::MissingColumnPolicy,
) -> Result<Table, PqError> {
    use pq_common::MissingColumnPolicy::*;
    let mut front: Vec<(String, Option<usize>)> = Vec::with_capacity(columns.len());
    for name in columns {
        match table.column_index(name) {
            Ok(i) => front.push((name.clone(), Some(i))),
            Err(e) => match missing {
                Error => return Err(e),
                Ignore => continue,
                UseNull => front.push((name.clone(), None)),
            },
        }
    }
    let named: std::collections::HashSet<usize> = front.iter().filter_map(|(_, i)| *i).collect();
    let rest: Vec<usize> = (0..table.column_count()).filter(|i| !named.contains(i)).collect();

    let mut out_columns = Vec::with_capacity(front.len() + rest.len());
    for (name, slot) in &front {
        match slot {
            Some(i) => out_columns.push(table.columns()[*i].clone()),
            None => out_columns.push(Column::any(name.clone())),
        }
    }
    for &i in &rest {
        out_columns.push(table.columns()[i].clone());
    }

    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|row| {
            let mut out = Vec::with_capacity(out_columns.len());
            for (_, slot) in &front {
                out.push(match slot {
                    Some(i) => row[*i].clone(),
                    None => Value::Null,
                });
            }
            for &i in &rest {
                out.push(row[i].clone());
            }
            out
        })
        .collect();
    Ok(Table::new_uniquifying(out_columns, rows))
}

/// Best-effort coercion used by `ChangeType`. Values that can't be coerced
/// become an in-cell error sentinel (§7) rather than aborting the query.
pub fn change_type(table: &Table, column: &str, data_type: DataType) -> Result<Table, PqError> {
    let idx = table.column_index(column)?;
    let mut columns = table.columns().to_vec();
    columns[idx].data_type = data_type;
    let rows: Vec<Vec<Value>> = table
        .iter_rows()
        .map(|mut row| {
            row[idx] = coerce(&row[idx], data_type);
            row
        })
        .collect();
    Table::new(columns, rows)
}

fn coerce(v: &Value, target: DataType) -> Value {
    if v.is_null() || v.is_error() {
        return v.clone();
    }
    match target {
        DataType::Any => v.clone(),
        DataType::Text => Value::Text(v.stringify()),
        DataType::Number => v
            .as_f64()
            .map(Value::Number)
            .or_else(|| v.as_text().and_then(|s| s.trim().parse::<f64>().ok()).map(Value::Number))
            .unwrap_or_else(|| Value::Error(ErrorValue::new(format!("cannot convert '{}' to Number", v.stringify())))),
        DataType::Boolean => match v {
            Value::Boolean(_) => v.clone(),
            Value::Int(i) => Value::Boolean(*i != 0),
            Value::Number(n) => Value::Boolean(*n != 0.0),
            Value::Text(s) => match s.to_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => Value::Error(ErrorValue::new(format!("cannot convert '{s}' to Boolean"))),
            },
            _ => Value::Error(ErrorValue::new("cannot convert to Boolean")),
        },
        DataType::Date => match v {
            Value::Date(_) => v.clone(),
            Value::DateTime(dt) => Value::Date(dt.date()),
            Value::Text(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or_else(|_| Value::Error(ErrorValue::new(format!("cannot convert '{s}' to Date")))),
            _ => Value::Error(ErrorValue::new("cannot convert to Date")),
        },
        DataType::DateTime => match v {
            Value::DateTime(_) => v.clone(),
            Value::Date(d) => Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap()),
            Value::Text(s) => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(Value::DateTime)
                .unwrap_or_else(|_| Value::Error(ErrorValue::new(format!("cannot convert '{s}' to DateTime")))),
            _ => Value::Error(ErrorValue::new("cannot convert to DateTime")),
        },
        DataType::DateTimeZone => match v {
            Value::DateTimeZone(_) => v.clone(),
            Value::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTimeZone(dt.with_timezone(&chrono::Utc)))
                .unwrap_or_else(|_| Value::Error(ErrorValue::new(format!("cannot convert '{s}' to DateTimeZone")))),
            _ => Value::Error(ErrorValue::new("cannot convert to DateTimeZone")),
        },
        DataType::Time => match v {
            Value::Time(_) => v.clone(),
            Value::Text(s) => chrono::NaiveTime::parse_from_str(s, "%H:%M:%S")
                .map(Value::Time)
                .unwrap_or_else(|_| Value::Error(ErrorValue::new(format!("cannot convert '{s}' to Time")))),
            _ => Value::Error(ErrorValue::new("cannot convert to Time")),
        },
        DataType::Duration => match v {
            Value::Duration(_) => v.clone(),
            Value::Number(n) => Value::Duration(chrono::Duration::milliseconds(*n as i64)),
            Value::Int(i) => Value::Duration(chrono::Duration::milliseconds(*i)),
            _ => Value::Error(ErrorValue::new("cannot convert to Duration")),
        },
        DataType::Decimal => v
            .as_f64()
            .map(|f| Value::Decimal(pq_common::Decimal::new((f * 100.0).round() as i128, 2)))
            .unwrap_or_else(|| Value::Error(ErrorValue::new(format!("cannot convert '{}' to Decimal", v.stringify())))),
        DataType::Binary => match v {
            Value::Binary(_) => v.clone(),
            _ => Value::Error(ErrorValue::new("cannot convert to Binary")),
        },
    }
}
