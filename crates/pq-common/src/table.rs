//! The table abstraction (§3, capability `ITable`).
//!
//! Two implementations coexist, as the spec requires: [`Table`] is the
//! simple row-backed representation that the operator library and engine
//! pass around everywhere (cheap to clone — it's `Arc`-backed and
//! immutable), and [`ColumnarTable`] is a column-major adapter for
//! Arrow-style inputs that converts to/from `Table` at the boundary.

use std::sync::Arc;

use crate::column::Column;
use crate::error::PqError;
use crate::value::Value;

/// Shared capability contract both table shapes satisfy.
pub trait ITable {
    fn columns(&self) -> &[Column];
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn column_index(&self, name: &str) -> Result<usize, PqError> {
        self.columns()
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PqError::UnknownColumn(name.to_string()))
    }

    fn cell(&self, row: usize, col: usize) -> Value;
    fn row(&self, row: usize) -> Vec<Value>;

    fn head(&self, n: usize) -> Vec<Vec<Value>> {
        (0..self.row_count().min(n)).map(|r| self.row(r)).collect()
    }

    /// Render as a 2-D grid, optionally with a header row of column names.
    fn to_grid(&self, include_header: bool) -> Vec<Vec<Value>> {
        let mut grid = Vec::with_capacity(self.row_count() + include_header as usize);
        if include_header {
            grid.push(
                self.columns()
                    .iter()
                    .map(|c| Value::Text(c.name.clone()))
                    .collect(),
            );
        }
        for r in 0..self.row_count() {
            grid.push(self.row(r));
        }
        grid
    }
}

/// Row-backed table. All rows are padded to `column_count()` on read:
/// shorter stored rows imply trailing nulls (ragged-row semantics).
/// Immutable after construction — operators always build a new `Table`.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Arc<Vec<Column>>,
    rows: Arc<Vec<Vec<Value>>>,
}

impl Table {
    /// Builds a table, enforcing column-name uniqueness (I2) and that no
    /// row exceeds `column_count()` in length (ragged rows are allowed to
    /// be *shorter*, never longer).
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, PqError> {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut seen = std::collections::HashSet::new();
        for n in &names {
            if !seen.insert(n) {
                return Err(PqError::InvalidArgument(format!(
                    "duplicate column name: {n}"
                )));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() > columns.len() {
                return Err(PqError::InvalidArgument(format!(
                    "row {i} has {} cells, more than {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
        })
    }

    /// Like `new`, but silently uniquifies collisions instead of erroring
    /// — used by operators that derive column names programmatically
    /// (e.g. `rename_column`, `transform_column_names`).
    pub fn new_uniquifying(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let unique = crate::column::make_unique_column_names(&names);
        let columns = columns
            .into_iter()
            .zip(unique)
            .map(|(c, n)| Column { name: n, ..c })
            .collect();
        Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
        }
    }

    pub fn empty() -> Self {
        Self {
            columns: Arc::new(Vec::new()),
            rows: Arc::new(Vec::new()),
        }
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count()).map(move |r| self.row(r))
    }

    pub fn rows_arc(&self) -> Arc<Vec<Vec<Value>>> {
        self.rows.clone()
    }

    pub fn columns_arc(&self) -> Arc<Vec<Column>> {
        self.columns.clone()
    }
}

impl ITable for Table {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: usize) -> Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn row(&self, row: usize) -> Vec<Value> {
        let width = self.column_count();
        let mut out = self.rows.get(row).cloned().unwrap_or_default();
        out.resize(width, Value::Null);
        out
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Table {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Table", 2)?;
        s.serialize_field("columns", &*self.columns)?;
        s.serialize_field("rows", &*self.rows)?;
        s.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Table {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            columns: Vec<Column>,
            rows: Vec<Vec<Value>>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Table::new(raw.columns, raw.rows).map_err(serde::de::Error::custom)
    }
}

/// Column-major adapter, the shape typical Arrow-style connectors hand
/// back. Exists purely as a boundary type: operators never consume it
/// directly, they call [`ColumnarTable::into_row_table`] first.
#[derive(Debug, Clone)]
pub struct ColumnarTable {
    columns: Vec<Column>,
    data: Vec<Vec<Value>>, // data[col][row]
}

impl ColumnarTable {
    pub fn new(columns: Vec<Column>, data: Vec<Vec<Value>>) -> Result<Self, PqError> {
        if data.len() != columns.len() {
            return Err(PqError::InvalidArgument(
                "columnar data width does not match column count".to_string(),
            ));
        }
        Ok(Self { columns, data })
    }

    pub fn into_row_table(self) -> Result<Table, PqError> {
        let row_count = self.data.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut rows = vec![Vec::with_capacity(self.columns.len()); row_count];
        for col in &self.data {
            for (r, row) in rows.iter_mut().enumerate() {
                row.push(col.get(r).cloned().unwrap_or(Value::Null));
            }
        }
        Table::new(self.columns, rows)
    }

    pub fn from_row_table(t: &Table) -> Self {
        let columns = t.columns().to_vec();
        let mut data = vec![Vec::with_capacity(t.row_count()); columns.len()];
        for row in t.iter_rows() {
            for (c, v) in row.into_iter().enumerate() {
                data[c].push(v);
            }
        }
        Self { columns, data }
    }
}

impl ITable for ColumnarTable {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn row_count(&self) -> usize {
        self.data.iter().map(|c| c.len()).max().unwrap_or(0)
    }

    fn cell(&self, row: usize, col: usize) -> Value {
        self.data
            .get(col)
            .and_then(|c| c.get(row))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn row(&self, row: usize) -> Vec<Value> {
        self.data.iter().map(|c| c.get(row).cloned().unwrap_or(Value::Null)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DataType;

    fn sample() -> Table {
        Table::new(
            vec![Column::new("A", DataType::Number), Column::new("B", DataType::Text)],
            vec![
                vec![Value::Int(1), Value::Text("x".into())],
                vec![Value::Int(2)], // ragged: B is implicitly null
            ],
        )
        .unwrap()
    }

    #[test]
    fn ragged_rows_pad_with_null() {
        let t = sample();
        assert_eq!(t.cell(1, 1), Value::Null);
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = Table::new(
            vec![Column::any("A"), Column::any("A")],
            vec![],
        );
        assert!(err.is_err());
    }

    #[test]
    fn columnar_round_trips_through_row_table() {
        let t = sample();
        let columnar = ColumnarTable::from_row_table(&t);
        let back = columnar.into_row_table().unwrap();
        assert_eq!(back.row(0), t.row(0));
        assert_eq!(back.row(1), t.row(1));
    }

    #[test]
    fn to_grid_includes_header_when_requested() {
        let t = sample();
        let grid = t.to_grid(true);
        assert_eq!(grid[0], vec![Value::Text("A".into()), Value::Text("B".into())]);
    }
}
