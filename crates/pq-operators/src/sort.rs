//! `SortRows` (§4.2). Stable, multi-key, per-key null placement.

use std::cmp::Ordering;

use pq_common::{Direction, ITable, NullsOrder, PqError, SortKey, Table, Value};

pub fn sort_rows(table: &Table, sort_by: &[SortKey]) -> Result<Table, PqError> {
    let idx: Vec<(usize, &SortKey)> = resolve_keys(table, sort_by)?;
    let mut rows: Vec<Vec<Value>> = table.iter_rows().collect();
    rows.sort_by(|a, b| compare_rows(a, b, &idx));
    Table::new(table.columns().to_vec(), rows)
}

/// Resolves each [`SortKey`]'s column name to an index once, so callers that
/// sort many batches of the same shape (the external-memory sort in
/// `pq-streaming`) don't repeat the column lookup per row comparison.
pub fn resolve_keys<'a>(table: &Table, sort_by: &'a [SortKey]) -> Result<Vec<(usize, &'a SortKey)>, PqError> {
    sort_by.iter().map(|k| Ok((table.column_index(&k.column)?, k))).collect()
}

/// The comparator `sort_rows` uses, exposed so the external-memory sort can
/// apply identical ordering semantics (including null placement) both to
/// batches sorted in memory and to the final k-way run merge.
pub fn compare_rows(a: &[Value], b: &[Value], idx: &[(usize, &SortKey)]) -> Ordering {
    for (i, key) in idx {
        let (av, bv) = (&a[*i], &b[*i]);
        let ord = match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => return flip_for_nulls(Ordering::Greater, key.nulls),
            (false, true) => return flip_for_nulls(Ordering::Less, key.nulls),
            (false, false) => av.partial_cmp(bv).unwrap_or(Ordering::Equal),
        };
        let ord = if key.direction == Direction::Desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// `nulls` placement is independent of `direction`: `NullsOrder::Last` always
/// puts nulls at the bottom, whether ascending or descending.
fn flip_for_nulls(natural: Ordering, nulls: NullsOrder) -> Ordering {
    match nulls {
        NullsOrder::Last => natural,
        NullsOrder::First => natural.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, Value};

    fn sample() -> Table {
        Table::new(
            vec![Column::any("a")],
            vec![vec![Value::Int(3)], vec![Value::Null], vec![Value::Int(1)], vec![Value::Int(2)]],
        )
        .unwrap()
    }

    #[test]
    fn ascending_with_nulls_last() {
        let out = sort_rows(
            &sample(),
            &[SortKey { column: "a".into(), direction: Direction::Asc, nulls: NullsOrder::Last }],
        )
        .unwrap();
        let vals: Vec<_> = out.iter_rows().map(|r| r[0].clone()).collect();
        assert_eq!(vals, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Null]);
    }

    #[test]
    fn descending_keeps_nulls_last_when_requested() {
        let out = sort_rows(
            &sample(),
            &[SortKey { column: "a".into(), direction: Direction::Desc, nulls: NullsOrder::Last }],
        )
        .unwrap();
        let vals: Vec<_> = out.iter_rows().map(|r| r[0].clone()).collect();
        assert_eq!(vals, vec![Value::Int(3), Value::Int(2), Value::Int(1), Value::Null]);
    }

    #[test]
    fn nulls_first_overrides_direction() {
        let out = sort_rows(
            &sample(),
            &[SortKey { column: "a".into(), direction: Direction::Asc, nulls: NullsOrder::First }],
        )
        .unwrap();
        assert_eq!(out.cell(0, 0), Value::Null);
    }
}
