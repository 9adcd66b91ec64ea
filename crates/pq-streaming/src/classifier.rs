//! Decides whether a step sequence can run through the batch-at-a-time
//! [`crate::pipeline::Pipeline`] or needs the materializing path (§4.4).

use pq_common::QueryOperation;

/// Operators whose per-batch behavior depends on at most a bounded window
/// of prior input — safe to run one batch at a time with no spill support.
fn is_narrow(op: &QueryOperation) -> bool {
    use QueryOperation::*;
    matches!(
        op,
        SelectColumns { .. }
            | RemoveColumns { .. }
            | RenameColumn { .. }
            | ChangeType { .. }
            | FilterRows { .. }
            | AddColumn { .. }
            | AddIndexColumn { .. }
            | TransformColumns { .. }
            | Take { .. }
            | Skip { .. }
            | RemoveRows { .. }
            | PromoteHeaders
    )
}

/// Operators that need the whole input but can still stream via the
/// external-memory operators in §4.5.
fn is_wide_but_spillable(op: &QueryOperation) -> bool {
    use QueryOperation::*;
    matches!(
        op,
        SortRows { .. } | GroupBy { .. } | DistinctRows { .. } | Pivot { .. } | Unpivot { .. } | Merge(_) | Append { .. } | FillDown { .. }
    )
}

/// A streamable sequence contains only narrow operators, optionally with
/// wide-but-spillable ones (handled by external-memory operators, not the
/// in-process `Pipeline`). Anything else forces the materializing path.
pub fn is_streamable(ops: &[QueryOperation]) -> bool {
    ops.iter().all(|op| is_narrow(op) || is_wide_but_spillable(op))
}

/// Splits a step list into the leading run the in-process `Pipeline` can
/// execute batch-at-a-time, and the remainder (starting at the first wide
/// op, if any) that must go through an external-memory operator or the
/// materializing path.
pub fn split_narrow_prefix(ops: &[QueryOperation]) -> (&[QueryOperation], &[QueryOperation]) {
    let split = ops.iter().position(|op| !is_narrow(op)).unwrap_or(ops.len());
    ops.split_at(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_only_sequence_is_streamable() {
        let ops = vec![
            QueryOperation::FilterRows { predicate: dummy_predicate() },
            QueryOperation::Take { n: 10 },
        ];
        assert!(is_streamable(&ops));
    }

    #[test]
    fn sequence_with_a_spill_op_is_still_streamable() {
        let ops = vec![QueryOperation::SortRows { sort_by: vec![] }];
        assert!(is_streamable(&ops));
    }

    #[test]
    fn split_narrow_prefix_stops_before_the_first_wide_op() {
        let ops = vec![
            QueryOperation::FilterRows { predicate: dummy_predicate() },
            QueryOperation::SortRows { sort_by: vec![] },
            QueryOperation::Take { n: 1 },
        ];
        let (narrow, rest) = split_narrow_prefix(&ops);
        assert_eq!(narrow.len(), 1);
        assert_eq!(rest.len(), 2);
    }

    fn dummy_predicate() -> pq_common::Predicate {
        pq_common::Predicate::Comparison(pq_common::Comparison {
            column: "a".to_string(),
            op: pq_common::CompareOp::IsNotNull,
            value: None,
            case_sensitive: None,
        })
    }
}
