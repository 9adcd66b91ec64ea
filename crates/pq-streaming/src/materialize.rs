//! Dispatches the wide operators of a streamable sequence (§4.4's second
//! list: `sort_rows, group_by, distinct_rows, pivot, unpivot, merge,
//! append, fill_down`) once their full input has been collected. Only
//! `sort_rows`, `group_by`, and `merge` have a defined external-memory
//! spill strategy (§4.5); the rest run through the ordinary in-memory
//! operator once materialized, since their output shape is data-dependent
//! in a way that has no defined partial/spillable decomposition.

use pq_common::{ITable, PqError, QueryOperation, Table};
use pq_operators::Dependencies;

use crate::external_group::ExternalGrouper;
use crate::external_merge::external_merge;
use crate::external_sort::ExternalSorter;
use crate::StreamEvent;

/// Options governing when the external operators spill, mirroring the
/// `maxInMemoryRows`/`spill` knobs in §4.5.
#[derive(Debug, Clone, Copy)]
pub struct StreamingOptions {
    pub batch_size: usize,
    pub max_in_memory_rows: usize,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self { batch_size: 1000, max_in_memory_rows: 100_000 }
    }
}

/// Runs one wide operator over its fully materialized input, using the
/// external-memory operator when the spec defines one for it.
pub fn run_wide_op(
    table: &Table,
    op: &QueryOperation,
    deps: &Dependencies,
    options: &StreamingOptions,
    on_event: &mut dyn FnMut(StreamEvent),
) -> Result<Table, PqError> {
    match op {
        QueryOperation::SortRows { sort_by } => {
            let mut sorter = ExternalSorter::new(table.columns().to_vec(), sort_by.clone(), options.max_in_memory_rows);
            if sorter.push_rows(table.iter_rows())? {
                #[cfg(feature = "tracing")]
                tracing::debug!(operator = "sort", max_in_memory_rows = options.max_in_memory_rows, "spilling to disk");
                on_event(StreamEvent::Spill { operator: "sort" });
            }
            let rows = sorter.finish()?;
            Table::new(table.columns().to_vec(), rows)
        }
        QueryOperation::GroupBy { keys, aggs } => {
            let mut grouper = ExternalGrouper::new(table.columns(), keys, aggs, options.max_in_memory_rows)?;
            let rows: Vec<_> = table.iter_rows().collect();
            if grouper.push_rows(&rows)? {
                #[cfg(feature = "tracing")]
                tracing::debug!(operator = "group_by", max_in_memory_rows = options.max_in_memory_rows, "spilling to disk");
                on_event(StreamEvent::Spill { operator: "group_by" });
            }
            grouper.finish()
        }
        QueryOperation::Merge(spec) => {
            let right = deps.get(&spec.right_query).ok_or_else(|| PqError::UnknownQuery(spec.right_query.clone()))?;
            let (out, spilled) = external_merge(table, right, spec, options.max_in_memory_rows)?;
            if spilled {
                #[cfg(feature = "tracing")]
                tracing::debug!(operator = "merge", max_in_memory_rows = options.max_in_memory_rows, "spilling to disk");
                on_event(StreamEvent::Spill { operator: "merge" });
            }
            Ok(out)
        }
        other => pq_operators::apply(table, other, deps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Aggregation, AggOp, Column, Direction, ITable, NullsOrder, SortKey, Value};

    #[test]
    fn sort_rows_dispatches_to_external_sorter() {
        let table = Table::new(vec![Column::any("a")], vec![vec![Value::Int(3)], vec![Value::Int(1)], vec![Value::Int(2)]]).unwrap();
        let op = QueryOperation::SortRows { sort_by: vec![SortKey { column: "a".into(), direction: Direction::Asc, nulls: NullsOrder::Last }] };
        let mut events = Vec::new();
        let out = run_wide_op(&table, &op, &Dependencies::new(), &StreamingOptions::default(), &mut |e| events.push(e)).unwrap();
        assert_eq!(out.cell(0, 0), Value::Int(1));
        assert!(events.is_empty());
    }

    #[test]
    fn group_by_spills_when_threshold_is_tiny() {
        let table = Table::new(
            vec![Column::any("dept"), Column::any("n")],
            vec![
                vec![Value::Text("a".into()), Value::Int(1)],
                vec![Value::Text("b".into()), Value::Int(2)],
                vec![Value::Text("c".into()), Value::Int(3)],
            ],
        )
        .unwrap();
        let op = QueryOperation::GroupBy {
            keys: vec!["dept".into()],
            aggs: vec![Aggregation { op: AggOp::Sum, column: Some("n".into()), as_name: None }],
        };
        let options = StreamingOptions { batch_size: 10, max_in_memory_rows: 1 };
        let mut events = Vec::new();
        let out = run_wide_op(&table, &op, &Dependencies::new(), &options, &mut |e| events.push(e)).unwrap();
        assert_eq!(out.row_count(), 3);
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Spill { operator: "group_by" })));
    }
}
