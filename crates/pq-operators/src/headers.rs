//! `PromoteHeaders` / `DemoteHeaders` (§4.2): swap the first data row for the
//! column-name row, or the reverse.

use pq_common::{Column, ITable, PqError, Table, Value};

pub fn promote_headers(table: &Table) -> Result<Table, PqError> {
    if table.row_count() == 0 {
        return Ok(table.clone());
    }
    let header = table.row(0);
    let names: Vec<String> = header.iter().map(|v| v.stringify()).collect();
    let columns: Vec<Column> = pq_common::make_unique_column_names(&names)
        .into_iter()
        .zip(table.columns())
        .map(|(name, c)| Column::new(name, c.data_type))
        .collect();
    let rows: Vec<Vec<Value>> = table.iter_rows().skip(1).collect();
    Table::new(columns, rows)
}

pub fn demote_headers(table: &Table) -> Result<Table, PqError> {
    let header_row: Vec<Value> = table.columns().iter().map(|c| Value::Text(c.name.clone())).collect();
    let columns: Vec<Column> = (1..=table.column_count()).map(|i| Column::any(format!("Column{i}"))).collect();
    let mut rows = vec![header_row];
    rows.extend(table.iter_rows());
    Table::new(columns, rows)
}
