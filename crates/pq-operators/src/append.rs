//! `Append` (§4.2): stacks rows from this table and additional queries'
//! tables. Output columns are the union of input columns in
//! first-encountered order; a table missing a column contributes null.

use pq_common::{Column, ITable, PqError, Table, Value};

pub fn append(first: &Table, rest: &[Table]) -> Result<Table, PqError> {
    let mut names: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for t in std::iter::once(first).chain(rest.iter()) {
        for c in t.columns() {
            if seen.insert(c.name.clone()) {
                names.push(c.name.clone());
            }
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .map(|n| {
            first
                .columns()
                .iter()
                .chain(rest.iter().flat_map(|t| t.columns()))
                .find(|c| &c.name == n)
                .cloned()
                .unwrap_or_else(|| Column::any(n.clone()))
        })
        .collect();

    let mut rows = Vec::new();
    for t in std::iter::once(first).chain(rest.iter()) {
        let idx: Vec<Option<usize>> = names.iter().map(|n| t.columns().iter().position(|c| &c.name == n)).collect();
        for row in t.iter_rows() {
            rows.push(idx.iter().map(|slot| slot.map(|i| row[i].clone()).unwrap_or(Value::Null)).collect());
        }
    }
    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_of_columns_fills_missing_with_null() {
        let a = Table::new(vec![Column::any("X"), Column::any("Y")], vec![vec![Value::Int(1), Value::Int(2)]]).unwrap();
        let b = Table::new(vec![Column::any("Y"), Column::any("Z")], vec![vec![Value::Int(3), Value::Int(4)]]).unwrap();
        let out = append(&a, &[b]).unwrap();
        assert_eq!(out.columns().iter().map(|c| c.name.clone()).collect::<Vec<_>>(), vec!["X", "Y", "Z"]);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(1, 0), Value::Null);
        assert_eq!(out.cell(1, 1), Value::Int(3));
    }
}
