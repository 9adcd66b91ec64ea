//! External-memory merge (§4.5): a streaming hash join. Below
//! `max_in_memory_rows` on the build (right) side this is just
//! `pq_operators::merge::merge` in one shot. Above it, both sides are
//! partitioned by the composite join-key hash into `PARTITION_COUNT`
//! buckets and each bucket pair is joined independently with the same
//! `pq_operators::merge::merge`, then the bucket results are concatenated.
//! Partitioning by key hash guarantees a left row and a right row can only
//! match when they land in the same bucket, so bucket-local joins (inner,
//! left, right, full) compose into the same result as one global join.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pq_common::{ITable, MergeSpec, PqError, Table};
use pq_operators::merge::{composite_key, resolve_comparers};

const PARTITION_COUNT: u64 = 16;

pub fn external_merge(left: &Table, right: &Table, spec: &MergeSpec, max_in_memory_rows: usize) -> Result<(Table, bool), PqError> {
    if right.row_count() <= max_in_memory_rows.max(1) {
        return Ok((pq_operators::merge::merge(left, right, spec)?, false));
    }

    let left_idx: Vec<usize> = spec.left_keys.iter().map(|k| left.column_index(k)).collect::<Result<_, _>>()?;
    let right_idx: Vec<usize> = spec.right_keys.iter().map(|k| right.column_index(k)).collect::<Result<_, _>>()?;
    let comparers = resolve_comparers(spec, left_idx.len());

    let mut left_buckets: Vec<Vec<Vec<pq_common::Value>>> = vec![Vec::new(); PARTITION_COUNT as usize];
    for row in left.iter_rows() {
        let bucket = bucket_of(&composite_key(&row, &left_idx, &comparers));
        left_buckets[bucket as usize].push(row);
    }
    let mut right_buckets: Vec<Vec<Vec<pq_common::Value>>> = vec![Vec::new(); PARTITION_COUNT as usize];
    for row in right.iter_rows() {
        let bucket = bucket_of(&composite_key(&row, &right_idx, &comparers));
        right_buckets[bucket as usize].push(row);
    }

    let mut parts = Vec::new();
    for bucket in 0..PARTITION_COUNT as usize {
        let l = Table::new(left.columns().to_vec(), std::mem::take(&mut left_buckets[bucket]))?;
        let r = Table::new(right.columns().to_vec(), std::mem::take(&mut right_buckets[bucket]))?;
        if l.row_count() == 0 && r.row_count() == 0 {
            continue;
        }
        parts.push(pq_operators::merge::merge(&l, &r, spec)?);
    }

    let out = match parts.split_first() {
        Some((first, rest)) => pq_operators::append::append(first, rest)?,
        None => pq_operators::merge::merge(left, right, spec)?,
    };
    Ok((out, true))
}

fn bucket_of(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() % PARTITION_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, JoinMode, JoinType, Value};

    fn spec() -> MergeSpec {
        MergeSpec {
            right_query: "right".into(),
            join_type: JoinType::Inner,
            left_keys: vec!["id".into()],
            right_keys: vec!["id".into()],
            join_mode: JoinMode::Flat,
            new_column_name: None,
            right_columns: None,
            comparer: None,
            comparers: vec![],
            algorithm_hint: None,
        }
    }

    #[test]
    fn below_threshold_matches_in_memory_merge() {
        let left = Table::new(vec![Column::any("id"), Column::any("a")], vec![vec![Value::Int(1), Value::Text("x".into())]]).unwrap();
        let right = Table::new(vec![Column::any("id"), Column::any("b")], vec![vec![Value::Int(1), Value::Text("y".into())]]).unwrap();
        let (out, spilled) = external_merge(&left, &right, &spec(), 100).unwrap();
        assert!(!spilled);
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn above_threshold_partitions_and_still_matches_all_pairs() {
        let left_rows: Vec<_> = (0..50).map(|i| vec![Value::Int(i), Value::Text(format!("l{i}"))]).collect();
        let right_rows: Vec<_> = (0..50).map(|i| vec![Value::Int(i), Value::Text(format!("r{i}"))]).collect();
        let left = Table::new(vec![Column::any("id"), Column::any("a")], left_rows).unwrap();
        let right = Table::new(vec![Column::any("id"), Column::any("b")], right_rows).unwrap();
        let (out, spilled) = external_merge(&left, &right, &spec(), 4).unwrap();
        assert!(spilled);
        assert_eq!(out.row_count(), 50);
    }
}
