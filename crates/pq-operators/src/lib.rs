//! The relational operator library (C2): pure functions `Table × Op →
//! Table`, one per row of §4.2/§4.3's operator table. [`apply`] is the
//! single entry point the engine calls per step; `merge`/`append` need
//! already-resolved dependency tables, supplied via `deps`.

pub mod append;
pub mod expand;
pub mod filter;
pub mod formula;
pub mod group;
pub mod headers;
pub mod merge;
pub mod pivot;
pub mod predicate;
pub mod schema;
pub mod select;
pub mod slice;
pub mod sort;
pub mod transform;

use std::collections::HashMap;

use pq_common::{PqError, QueryId, QueryOperation, Table};

/// Already-executed dependency tables, keyed by query id, that `merge`
/// and `append` steps may reference.
pub type Dependencies = HashMap<QueryId, Table>;

fn dep<'a>(deps: &'a Dependencies, id: &QueryId) -> Result<&'a Table, PqError> {
    deps.get(id).ok_or_else(|| PqError::UnknownQuery(id.clone()))
}

/// Applies one query step's operation to `table`, returning the table it
/// produces. `merge`/`append` pull their other side out of `deps` (the
/// engine is responsible for having already executed those dependencies).
pub fn apply(table: &Table, op: &QueryOperation, deps: &Dependencies) -> Result<Table, PqError> {
    use QueryOperation::*;
    match op {
        SelectColumns { columns } => select::select_columns(table, columns),
        RemoveColumns { columns } => select::remove_columns(table, columns),
        RenameColumn { old, new } => select::rename_column(table, old, new),
        ReorderColumns { columns, missing } => select::reorder_columns(table, columns, *missing),
        ChangeType { column, data_type } => select::change_type(table, column, *data_type),
        FilterRows { predicate } => filter::filter_rows(table, predicate),
        SortRows { sort_by } => sort::sort_rows(table, sort_by),
        DistinctRows { columns } => filter::distinct_rows(table, columns.as_deref()),
        RemoveRowsWithErrors { columns } => filter::remove_rows_with_errors(table, columns.as_deref()),
        GroupBy { keys, aggs } => group::group_by(table, keys, aggs),
        AddColumn { name, formula } => transform::add_column(table, name, formula),
        AddIndexColumn { name, initial, increment } => transform::add_index_column(table, name, *initial, *increment),
        CombineColumns { columns, delimiter, new_name } => transform::combine_columns(table, columns, delimiter, new_name),
        SplitColumn { column, delimiter, new_columns } => {
            transform::split_column(table, column, delimiter, new_columns.as_deref())
        }
        TransformColumns { transforms } => transform::transform_columns(table, transforms),
        TransformColumnNames { op } => transform::transform_column_names(table, *op),
        FillDown { columns } => transform::fill_down(table, columns),
        ReplaceValues { column, find, replace } => transform::replace_values(table, column, find, replace),
        ReplaceErrorValues { replacements } => transform::replace_error_values(table, replacements),
        PromoteHeaders => headers::promote_headers(table),
        DemoteHeaders => headers::demote_headers(table),
        Take { n } => slice::take(table, *n),
        Skip { n } => slice::skip(table, *n),
        RemoveRows { offset, count } => slice::remove_rows(table, *offset, *count),
        Pivot { row_col, value_col, agg } => pivot::pivot(table, row_col, value_col, *agg),
        Unpivot { columns, name_col, value_col } => pivot::unpivot(table, columns, name_col, value_col),
        Merge(spec) => {
            let right = dep(deps, &spec.right_query)?;
            merge::merge(table, right, spec)
        }
        ExpandTableColumn { column, columns, new_column_names } => {
            expand::expand_table_column(table, column, columns.as_deref(), new_column_names.as_deref())
        }
        Append { query_ids } => {
            let others: Vec<Table> = query_ids.iter().map(|id| dep(deps, id).cloned()).collect::<Result<_, _>>()?;
            append::append(table, &others)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, ITable, Value};

    #[test]
    fn apply_dispatches_select_columns() {
        let t = Table::new(vec![Column::any("a"), Column::any("b")], vec![vec![Value::Int(1), Value::Int(2)]]).unwrap();
        let deps = Dependencies::new();
        let out = apply(&t, &QueryOperation::SelectColumns { columns: vec!["b".to_string()] }, &deps).unwrap();
        assert_eq!(out.column_count(), 1);
    }

    #[test]
    fn apply_merge_looks_up_right_table_in_deps() {
        use pq_common::{Comparer, JoinMode, JoinType, MergeSpec};
        let left = Table::new(vec![Column::any("k")], vec![vec![Value::Int(1)]]).unwrap();
        let right = Table::new(vec![Column::any("k"), Column::any("v")], vec![vec![Value::Int(1), Value::Text("x".into())]]).unwrap();
        let mut deps = Dependencies::new();
        deps.insert("right-query".to_string(), right);
        let op = QueryOperation::Merge(MergeSpec {
            right_query: "right-query".to_string(),
            join_type: JoinType::Inner,
            left_keys: vec!["k".to_string()],
            right_keys: vec!["k".to_string()],
            join_mode: JoinMode::Flat,
            new_column_name: None,
            right_columns: None,
            comparer: Some(Comparer::Ordinal),
            comparers: vec![],
            algorithm_hint: None,
        });
        let out = apply(&left, &op, &deps).unwrap();
        assert_eq!(out.column_count(), 2);
    }

    #[test]
    fn apply_merge_without_dependency_is_unknown_query() {
        use pq_common::{JoinMode, JoinType, MergeSpec};
        let left = Table::new(vec![Column::any("k")], vec![vec![Value::Int(1)]]).unwrap();
        let deps = Dependencies::new();
        let op = QueryOperation::Merge(MergeSpec {
            right_query: "missing".to_string(),
            join_type: JoinType::Inner,
            left_keys: vec!["k".to_string()],
            right_keys: vec!["k".to_string()],
            join_mode: JoinMode::Flat,
            new_column_name: None,
            right_columns: None,
            comparer: None,
            comparers: vec![],
            algorithm_hint: None,
        });
        assert!(apply(&left, &op, &deps).is_err());
    }
}
