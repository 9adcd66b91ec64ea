//! `Merge` (§4.3): hash-based equi-join over a composite key, flat or
//! nested output shape.

use pq_common::{Column, Comparer, ITable, JoinMode, JoinType, MergeSpec, PqError, Table, Value};
use rustc_hash::FxHashMap;

pub fn merge(left: &Table, right: &Table, spec: &MergeSpec) -> Result<Table, PqError> {
    if spec.left_keys.len() != spec.right_keys.len() {
        return Err(PqError::InvalidJoin(format!(
            "left keys ({}) and right keys ({}) differ in length",
            spec.left_keys.len(),
            spec.right_keys.len()
        )));
    }
    let left_idx: Vec<usize> = spec
        .left_keys
        .iter()
        .map(|k| left.column_index(k))
        .collect::<Result<_, _>>()?;
    let right_idx: Vec<usize> = spec
        .right_keys
        .iter()
        .map(|k| right.column_index(k))
        .collect::<Result<_, _>>()?;
    let comparers = resolve_comparers(spec, left_idx.len());

    let mut right_index: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for r in 0..right.row_count() {
        let row = right.row(r);
        right_index.entry(composite_key(&row, &right_idx, &comparers)).or_default().push(r);
    }

    match spec.join_mode {
        JoinMode::Flat => merge_flat(left, right, spec, &left_idx, &right_idx, &comparers, &right_index),
        JoinMode::Nested => merge_nested(left, right, spec, &left_idx, &comparers, &right_index),
    }
}

/// Exposed so the external-memory partitioned join in `pq-streaming` can
/// hash left/right rows into the same key space this in-memory join uses.
pub fn resolve_comparers(spec: &MergeSpec, n: usize) -> Vec<Comparer> {
    if spec.comparers.len() == n {
        return spec.comparers.clone();
    }
    let uniform = spec.comparer.unwrap_or(Comparer::Ordinal);
    vec![uniform; n]
}

pub fn composite_key(row: &[Value], idx: &[usize], comparers: &[Comparer]) -> String {
    idx.iter()
        .zip(comparers)
        .map(|(&i, cmp)| match cmp {
            Comparer::OrdinalIgnoreCase => row[i].value_key_ci(),
            Comparer::Ordinal => row[i].value_key(),
        })
        .collect::<Vec<_>>()
        .join("\u{1}")
}

fn merge_flat(
    left: &Table,
    right: &Table,
    spec: &MergeSpec,
    left_idx: &[usize],
    right_idx: &[usize],
    comparers: &[Comparer],
    right_index: &FxHashMap<String, Vec<usize>>,
) -> Result<Table, PqError> {
    let mut drop_right: std::collections::HashSet<usize> = std::collections::HashSet::new();
    for p in 0..left_idx.len() {
        if left.columns()[left_idx[p]].name == right.columns()[right_idx[p]].name {
            drop_right.insert(right_idx[p]);
        }
    }
    let right_keep: Vec<usize> = (0..right.column_count()).filter(|i| !drop_right.contains(i)).collect();

    let mut raw_names: Vec<String> = left.columns().iter().map(|c| c.name.clone()).collect();
    raw_names.extend(right_keep.iter().map(|&i| right.columns()[i].name.clone()));
    let unique_names = pq_common::make_unique_column_names(&raw_names);
    let mut out_columns: Vec<Column> = left.columns().to_vec();
    out_columns.extend(right_keep.iter().map(|&i| right.columns()[i].clone()));
    for (c, n) in out_columns.iter_mut().zip(unique_names) {
        c.name = n;
    }

    let include_left_unmatched = matches!(spec.join_type, JoinType::Left | JoinType::Full);
    let include_right_unmatched = matches!(spec.join_type, JoinType::Right | JoinType::Full);
    let inner_like = matches!(spec.join_type, JoinType::Inner | JoinType::Right);

    let mut matched_right: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let right_nulls = vec![Value::Null; right_keep.len()];
    let mut rows = Vec::new();

    for l in 0..left.row_count() {
        let lrow = left.row(l);
        let key = composite_key(&lrow, left_idx, comparers);
        match right_index.get(&key) {
            Some(matches) if !matches.is_empty() => {
                for &r in matches {
                    matched_right.insert(r);
                    let rrow = right.row(r);
                    let mut out = lrow.clone();
                    out.extend(right_keep.iter().map(|&i| rrow[i].clone()));
                    rows.push(out);
                }
            }
            _ => {
                if !inner_like && include_left_unmatched {
                    let mut out = lrow.clone();
                    out.extend(right_nulls.clone());
                    rows.push(out);
                }
            }
        }
    }

    if include_right_unmatched {
        let left_nulls = vec![Value::Null; left.column_count()];
        for r in 0..right.row_count() {
            if matched_right.contains(&r) {
                continue;
            }
            let rrow = right.row(r);
            let mut out = left_nulls.clone();
            out.extend(right_keep.iter().map(|&i| rrow[i].clone()));
            rows.push(out);
        }
    }

    Table::new(out_columns, rows)
}

fn merge_nested(
    left: &Table,
    right: &Table,
    spec: &MergeSpec,
    left_idx: &[usize],
    comparers: &[Comparer],
    right_index: &FxHashMap<String, Vec<usize>>,
) -> Result<Table, PqError> {
    let proj_names: Vec<String> = spec
        .right_columns
        .clone()
        .unwrap_or_else(|| right.columns().iter().map(|c| c.name.clone()).collect());
    let proj_idx: Vec<usize> = proj_names.iter().map(|n| right.column_index(n)).collect::<Result<_, _>>()?;
    let proj_columns: Vec<Column> = proj_idx.iter().map(|&i| right.columns()[i].clone()).collect();

    let new_name = spec.new_column_name.clone().unwrap_or_else(|| spec.right_query.clone());
    let mut out_names: Vec<String> = left.columns().iter().map(|c| c.name.clone()).collect();
    out_names.push(new_name);
    let out_names = pq_common::make_unique_column_names(&out_names);
    let mut out_columns: Vec<Column> = left.columns().to_vec();
    out_columns.push(Column::any(out_names.last().unwrap().clone()));

    let include_left_unmatched = matches!(spec.join_type, JoinType::Left | JoinType::Full);
    let include_right_unmatched = matches!(spec.join_type, JoinType::Right | JoinType::Full);
    let inner_like = matches!(spec.join_type, JoinType::Inner | JoinType::Right);

    let mut matched_right: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut rows = Vec::new();

    for l in 0..left.row_count() {
        let lrow = left.row(l);
        let key = composite_key(&lrow, left_idx, comparers);
        match right_index.get(&key) {
            Some(matches) if !matches.is_empty() => {
                for &r in matches {
                    matched_right.insert(r);
                }
                let nested_rows: Vec<Vec<Value>> = matches
                    .iter()
                    .map(|&r| {
                        let rrow = right.row(r);
                        proj_idx.iter().map(|&i| rrow[i].clone()).collect()
                    })
                    .collect();
                let nested = Table::new(proj_columns.clone(), nested_rows)?;
                let mut out = lrow.clone();
                out.push(Value::Table(nested));
                rows.push(out);
            }
            _ => {
                if !inner_like && include_left_unmatched {
                    let empty = Table::new(proj_columns.clone(), vec![])?;
                    let mut out = lrow.clone();
                    out.push(Value::Table(empty));
                    rows.push(out);
                }
            }
        }
    }

    if include_right_unmatched {
        let left_nulls = vec![Value::Null; left.column_count()];
        for r in 0..right.row_count() {
            if matched_right.contains(&r) {
                continue;
            }
            let rrow = right.row(r);
            let nested_row: Vec<Value> = proj_idx.iter().map(|&i| rrow[i].clone()).collect();
            let single = Table::new(proj_columns.clone(), vec![nested_row])?;
            let mut out = left_nulls.clone();
            out.push(Value::Table(single));
            rows.push(out);
        }
    }

    Table::new(out_columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::Column;

    fn left_table() -> Table {
        Table::new(
            vec![Column::any("Key"), Column::any("Left")],
            vec![vec![Value::Null, Value::Text("L1".into())]],
        )
        .unwrap()
    }

    fn right_table() -> Table {
        Table::new(
            vec![Column::any("Key"), Column::any("Right")],
            vec![vec![Value::Null, Value::Text("R1".into())]],
        )
        .unwrap()
    }

    fn spec(join_type: JoinType, mode: JoinMode) -> MergeSpec {
        MergeSpec {
            right_query: "right".into(),
            join_type,
            left_keys: vec!["Key".into()],
            right_keys: vec!["Key".into()],
            join_mode: mode,
            new_column_name: Some("Matches".into()),
            right_columns: None,
            comparer: None,
            comparers: vec![],
            algorithm_hint: None,
        }
    }

    #[test]
    fn inner_join_matches_null_keys() {
        let out = merge(&left_table(), &right_table(), &spec(JoinType::Inner, JoinMode::Flat)).unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.cell(0, 1), Value::Text("L1".into()));
        assert_eq!(out.cell(0, 2), Value::Text("R1".into()));
    }

    #[test]
    fn flat_mode_drops_duplicate_key_column() {
        let out = merge(&left_table(), &right_table(), &spec(JoinType::Inner, JoinMode::Flat)).unwrap();
        assert_eq!(out.column_count(), 3); // Key, Left, Right (not Key·2)
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_with_right_nulls() {
        let left = Table::new(
            vec![Column::any("Key"), Column::any("Left")],
            vec![vec![Value::Int(1), Value::Text("L1".into())], vec![Value::Int(2), Value::Text("L2".into())]],
        )
        .unwrap();
        let right = Table::new(
            vec![Column::any("Key"), Column::any("Right")],
            vec![vec![Value::Int(1), Value::Text("R1".into())]],
        )
        .unwrap();
        let out = merge(&left, &right, &spec(JoinType::Left, JoinMode::Flat)).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(1, 2), Value::Null);
    }

    #[test]
    fn nested_mode_wraps_matches_in_a_table_value() {
        let out = merge(&left_table(), &right_table(), &spec(JoinType::Left, JoinMode::Nested)).unwrap();
        assert_eq!(out.column_count(), 3);
        match out.cell(0, 2) {
            Value::Table(t) => assert_eq!(t.row_count(), 1),
            other => panic!("expected nested table, got {other:?}"),
        }
    }

    #[test]
    fn nested_mode_unmatched_left_row_gets_empty_table() {
        let left = Table::new(vec![Column::any("Key")], vec![vec![Value::Int(9)]]).unwrap();
        let out = merge(&left, &right_table(), &spec(JoinType::Left, JoinMode::Nested)).unwrap();
        match out.cell(0, 1) {
            Value::Table(t) => assert_eq!(t.row_count(), 0),
            other => panic!("expected empty nested table, got {other:?}"),
        }
    }
}
