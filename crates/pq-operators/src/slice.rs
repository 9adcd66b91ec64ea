//! Row-windowing operators (§4.2): `Take`, `Skip`, `RemoveRows`.

use pq_common::{ITable, PqError, Table};

pub fn take(table: &Table, n: usize) -> Result<Table, PqError> {
    let rows = table.iter_rows().take(n).collect::<Vec<_>>();
    Table::new(table.columns().to_vec(), rows)
}

pub fn skip(table: &Table, n: usize) -> Result<Table, PqError> {
    let rows = table.iter_rows().skip(n).collect::<Vec<_>>();
    Table::new(table.columns().to_vec(), rows)
}

pub fn remove_rows(table: &Table, offset: usize, count: usize) -> Result<Table, PqError> {
    let rows: Vec<_> = table
        .iter_rows()
        .enumerate()
        .filter(|(i, _)| *i < offset || *i >= offset + count)
        .map(|(_, r)| r)
        .collect();
    Table::new(table.columns().to_vec(), rows)
}
