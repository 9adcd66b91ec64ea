//! External-memory group-by (§4.5). Uses an in-memory hash map keyed by the
//! composite group key until the distinct-key count exceeds
//! `max_in_memory_rows`; beyond that, partial per-group state is spilled by
//! key hash into buckets and each bucket is re-aggregated independently.
//! `sum`/`count`/`min`/`max`/`average` all commute with partitioning
//! (average is carried as a running `(sum, count)` pair); `countDistinct`
//! keeps a per-group distinct-value set, which is spilled one raw value per
//! key entry and re-deduplicated per bucket.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pq_common::{AggOp, Aggregation, Column, DataType, ITable, PqError, Table, Value};
use rustc_hash::FxHashMap;

use crate::spill::SpillArena;

const BUCKET_COUNT: u64 = 16;

#[derive(Clone, Default)]
struct PartialAgg {
    count: u64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
    distinct: std::collections::HashSet<String>,
}

impl PartialAgg {
    fn absorb_value(&mut self, v: &Value) {
        if v.is_null() {
            return;
        }
        self.count += 1;
        if let Some(f) = v.as_f64() {
            self.sum += f;
        }
        if self.min.as_ref().map(|m| v.partial_cmp(m) == Some(std::cmp::Ordering::Less)).unwrap_or(true) {
            self.min = Some(v.clone());
        }
        if self.max.as_ref().map(|m| v.partial_cmp(m) == Some(std::cmp::Ordering::Greater)).unwrap_or(true) {
            self.max = Some(v.clone());
        }
        self.distinct.insert(v.value_key());
    }

    fn absorb_row_count(&mut self) {
        self.count += 1;
    }
}

struct GroupState {
    key_values: Vec<Value>,
    aggs: Vec<PartialAgg>,
}

pub struct ExternalGrouper {
    keys: Vec<usize>,
    agg_idx: Vec<Option<usize>>,
    aggs: Vec<Aggregation>,
    columns: Vec<Column>,
    max_in_memory_rows: usize,
    groups: FxHashMap<String, GroupState>,
    order: Vec<String>,
    arena: Option<SpillArena>,
    spilled: bool,
}

impl ExternalGrouper {
    pub fn new(table_columns: &[Column], keys: &[String], aggs: &[Aggregation], max_in_memory_rows: usize) -> Result<Self, PqError> {
        let probe = Table::new(table_columns.to_vec(), vec![])?;
        let key_idx: Vec<usize> = keys.iter().map(|k| probe.column_index(k)).collect::<Result<_, _>>()?;
        let agg_idx: Vec<Option<usize>> =
            aggs.iter().map(|a| a.column.as_deref().map(|c| probe.column_index(c)).transpose()).collect::<Result<_, _>>()?;
        Ok(Self {
            keys: key_idx,
            agg_idx,
            aggs: aggs.to_vec(),
            columns: table_columns.to_vec(),
            max_in_memory_rows: max_in_memory_rows.max(1),
            groups: FxHashMap::default(),
            order: Vec::new(),
            arena: None,
            spilled: false,
        })
    }

    fn composite_key(&self, row: &[Value]) -> String {
        self.keys.iter().map(|&i| row[i].value_key()).collect::<Vec<_>>().join("\u{1}")
    }

    /// Absorbs one batch of rows. Returns `true` exactly the first time this
    /// call causes a spill, so callers can raise a one-shot
    /// `stream:spill { operator: "group_by" }` event.
    pub fn push_rows(&mut self, rows: &[Vec<Value>]) -> Result<bool, PqError> {
        let mut did_spill = false;
        for row in rows {
            let key = self.composite_key(row);
            if !self.groups.contains_key(&key) && self.groups.len() >= self.max_in_memory_rows {
                self.spill_row(&key, row)?;
                if !self.spilled {
                    self.spilled = true;
                    did_spill = true;
                }
                continue;
            }
            let state = self.groups.entry(key.clone()).or_insert_with(|| {
                self.order.push(key.clone());
                GroupState {
                    key_values: self.keys.iter().map(|&i| row[i].clone()).collect(),
                    aggs: vec![PartialAgg::default(); self.aggs.len()],
                }
            });
            absorb(state, row, &self.aggs, &self.agg_idx);
        }
        Ok(did_spill)
    }

    fn spill_row(&mut self, key: &str, row: &[Value]) -> Result<(), PqError> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let bucket = hasher.finish() % BUCKET_COUNT;
        let arena = self.arena.get_or_insert_with(|| SpillArena::new().expect("spill arena"));
        arena.append_bucket_entry(bucket, key, row)
    }

    /// Consumes the grouper and produces the final aggregated table.
    pub fn finish(self) -> Result<Table, PqError> {
        let mut out_columns: Vec<Column> = self.keys.iter().map(|&i| self.columns[i].clone()).collect();
        for (agg, col) in self.aggs.iter().zip(&self.agg_idx) {
            let name = agg
                .as_name
                .clone()
                .unwrap_or_else(|| pq_operators::group::default_agg_name(agg.op, col.map(|i| self.columns[i].name.as_str())));
            let dt = match agg.op {
                AggOp::Count | AggOp::CountDistinct => DataType::Number,
                _ => col.map(|i| self.columns[i].data_type).unwrap_or(DataType::Number),
            };
            out_columns.push(Column::new(name, dt));
        }

        let mut rows = Vec::new();
        if let Some(arena) = &self.arena {
            // Re-read every in-memory group's rows back through the bucket path so a
            // key that started in memory but whose later rows spilled still merges
            // with its spilled partial state, rather than producing two partial rows.
            let mut bucketed: FxHashMap<u64, FxHashMap<String, GroupState>> = FxHashMap::default();
            for key in &self.order {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                let bucket = hasher.finish() % BUCKET_COUNT;
                let state = self.groups.get(key).expect("tracked key present");
                bucketed.entry(bucket).or_default().insert(key.clone(), clone_state(state));
            }

            for bucket in 0..BUCKET_COUNT {
                let mut local = bucketed.remove(&bucket).unwrap_or_default();
                let mut local_order: Vec<String> = local.keys().cloned().collect();
                for entry in arena.read_bucket(bucket)? {
                    let (key, row) = entry?;
                    if !local.contains_key(&key) {
                        local_order.push(key.clone());
                        let key_values = self.keys.iter().map(|&i| row[i].clone()).collect();
                        local.insert(key.clone(), GroupState { key_values, aggs: vec![PartialAgg::default(); self.aggs.len()] });
                    }
                    let state = local.get_mut(&key).expect("just inserted");
                    absorb(state, &row, &self.aggs, &self.agg_idx);
                }
                for key in &local_order {
                    if let Some(state) = local.get(key) {
                        rows.push(finalize_row(state, &self.aggs));
                    }
                }
            }
        } else {
            for key in &self.order {
                let state = &self.groups[key];
                rows.push(finalize_row(state, &self.aggs));
            }
        }

        Ok(Table::new_uniquifying(out_columns, rows))
    }
}

fn clone_state(state: &GroupState) -> GroupState {
    GroupState { key_values: state.key_values.clone(), aggs: state.aggs.clone() }
}

fn absorb(state: &mut GroupState, row: &[Value], aggs: &[Aggregation], agg_idx: &[Option<usize>]) {
    for (partial, (agg, col)) in state.aggs.iter_mut().zip(aggs.iter().zip(agg_idx)) {
        match agg.op {
            AggOp::Count => match col {
                Some(&i) => {
                    if !row[i].is_null() {
                        partial.absorb_row_count();
                    }
                }
                None => partial.absorb_row_count(),
            },
            _ => {
                if let Some(&i) = col {
                    partial.absorb_value(&row[i]);
                }
            }
        }
    }
}

fn finalize_row(state: &GroupState, aggs: &[Aggregation]) -> Vec<Value> {
    let mut row = state.key_values.clone();
    for (agg, partial) in aggs.iter().zip(&state.aggs) {
        let v = match agg.op {
            AggOp::Count => Value::Int(partial.count as i64),
            AggOp::CountDistinct => Value::Int(partial.distinct.len() as i64),
            AggOp::Sum => Value::Number(partial.sum),
            AggOp::Average => {
                if partial.count == 0 {
                    Value::Null
                } else {
                    Value::Number(partial.sum / partial.count as f64)
                }
            }
            AggOp::Min => partial.min.clone().unwrap_or(Value::Null),
            AggOp::Max => partial.max.clone().unwrap_or(Value::Null),
        };
        row.push(v);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> Vec<Column> {
        vec![Column::any("dept"), Column::any("salary")]
    }

    #[test]
    fn below_threshold_sums_in_memory() {
        let mut g = ExternalGrouper::new(
            &sample_columns(),
            &["dept".to_string()],
            &[Aggregation { op: AggOp::Sum, column: Some("salary".to_string()), as_name: None }],
            100,
        )
        .unwrap();
        g.push_rows(&[
            vec![Value::Text("eng".into()), Value::Int(100)],
            vec![Value::Text("eng".into()), Value::Int(200)],
            vec![Value::Text("ops".into()), Value::Int(50)],
        ])
        .unwrap();
        let out = g.finish().unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.cell(0, 1), Value::Number(300.0));
    }

    #[test]
    fn above_threshold_spills_by_key_and_still_aggregates_correctly() {
        let mut g = ExternalGrouper::new(
            &sample_columns(),
            &["dept".to_string()],
            &[Aggregation { op: AggOp::Sum, column: Some("salary".to_string()), as_name: None }],
            1,
        )
        .unwrap();
        let mut spilled = false;
        for row in [
            vec![Value::Text("eng".into()), Value::Int(100)],
            vec![Value::Text("ops".into()), Value::Int(50)],
            vec![Value::Text("hr".into()), Value::Int(10)],
            vec![Value::Text("eng".into()), Value::Int(200)],
        ] {
            if g.push_rows(&[row]).unwrap() {
                spilled = true;
            }
        }
        assert!(spilled);
        let out = g.finish().unwrap();
        let mut totals: FxHashMap<String, f64> = FxHashMap::default();
        for r in out.iter_rows() {
            totals.insert(r[0].stringify(), r[1].as_f64().unwrap());
        }
        assert_eq!(totals["eng"], 300.0);
        assert_eq!(totals["ops"], 50.0);
        assert_eq!(totals["hr"], 10.0);
    }

    #[test]
    fn count_over_column_skips_nulls_while_count_star_counts_rows() {
        let mut g = ExternalGrouper::new(
            &sample_columns(),
            &["dept".to_string()],
            &[
                Aggregation { op: AggOp::Count, column: Some("salary".to_string()), as_name: Some("non_null".into()) },
                Aggregation { op: AggOp::Count, column: None, as_name: Some("rows".into()) },
            ],
            100,
        )
        .unwrap();
        g.push_rows(&[
            vec![Value::Text("eng".into()), Value::Null],
            vec![Value::Text("eng".into()), Value::Int(200)],
            vec![Value::Text("eng".into()), Value::Null],
        ])
        .unwrap();
        let out = g.finish().unwrap();
        assert_eq!(out.cell(0, 1), Value::Int(1));
        assert_eq!(out.cell(0, 2), Value::Int(3));
    }
}
