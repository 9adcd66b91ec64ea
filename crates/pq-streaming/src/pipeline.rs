//! The batch-at-a-time `Pipeline` (§4.4). Each batch is materialized as a
//! tiny [`Table`] and run back through `pq_operators::apply` — the narrow
//! operators are pure per-batch transforms, so batching them through the
//! same C2 entry point keeps one implementation of operator semantics
//! instead of a second row-at-a-time copy. The operators that need memory
//! across batch boundaries (`add_index_column`'s counter, `take`/`skip`'s
//! remaining count, `promote_headers`'s first-row capture) carry explicit
//! per-step state instead.

use pq_common::{Column, ITable, PqError, QueryOperation, Table, Value};
use pq_operators::Dependencies;

pub struct BatchOutput {
    pub rows: Vec<Vec<Value>>,
    pub done: bool,
}

enum StepState {
    Stateless,
    AddIndex { next: i64 },
    Take { remaining: usize },
    Skip { remaining: usize },
    PromoteHeaders { consumed: bool },
}

struct Step {
    op: QueryOperation,
    state: StepState,
}

/// Runs a narrow operator sequence (per [`crate::classifier::is_streamable`])
/// one batch at a time.
pub struct Pipeline {
    steps: Vec<Step>,
    columns: Vec<Column>,
}

impl Pipeline {
    pub fn new(ops: Vec<QueryOperation>, initial_columns: Vec<Column>) -> Self {
        let steps = ops
            .into_iter()
            .map(|op| {
                let state = match &op {
                    QueryOperation::AddIndexColumn { initial, .. } => StepState::AddIndex { next: *initial },
                    QueryOperation::Take { n } => StepState::Take { remaining: *n },
                    QueryOperation::Skip { n } => StepState::Skip { remaining: *n },
                    QueryOperation::PromoteHeaders => StepState::PromoteHeaders { consumed: false },
                    _ => StepState::Stateless,
                };
                Step { op, state }
            })
            .collect();
        Self { steps, columns: initial_columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Feeds one batch through every step; an empty slice flushes (no more
    /// input will ever arrive, e.g. at end-of-stream).
    pub fn transform_batch(&mut self, mut rows: Vec<Vec<Value>>) -> Result<BatchOutput, PqError> {
        let mut done = false;
        let empty_deps = Dependencies::new();

        for step in &mut self.steps {
            if rows.is_empty() && !matches!(step.state, StepState::PromoteHeaders { consumed: false }) {
                continue;
            }
            match (&step.op, &mut step.state) {
                (QueryOperation::PromoteHeaders, StepState::PromoteHeaders { consumed }) => {
                    if !*consumed {
                        if rows.is_empty() {
                            // No header row has arrived yet; nothing downstream can run this round.
                            return Ok(BatchOutput { rows: vec![], done: false });
                        }
                        let header = rows.remove(0);
                        let names: Vec<String> = header.iter().map(|v| v.stringify()).collect();
                        let names = pq_common::make_unique_column_names(&names);
                        self.columns = names
                            .into_iter()
                            .zip(self.columns.iter())
                            .map(|(n, c)| Column::new(n, c.data_type))
                            .collect();
                        *consumed = true;
                    }
                }
                (QueryOperation::AddIndexColumn { name, increment, .. }, StepState::AddIndex { next }) => {
                    let table = Table::new(self.columns.clone(), rows)?;
                    let out = pq_operators::transform::add_index_column(&table, name, *next, *increment)?;
                    *next += *increment * out.row_count() as i64;
                    self.columns = out.columns().to_vec();
                    rows = out.iter_rows().collect();
                }
                (QueryOperation::Take { .. }, StepState::Take { remaining }) => {
                    let take_n = (*remaining).min(rows.len());
                    rows.truncate(take_n);
                    *remaining -= take_n;
                    if *remaining == 0 {
                        done = true;
                    }
                }
                (QueryOperation::Skip { .. }, StepState::Skip { remaining }) => {
                    let skip_n = (*remaining).min(rows.len());
                    rows.drain(0..skip_n);
                    *remaining -= skip_n;
                }
                (op, StepState::Stateless) => {
                    let table = Table::new(self.columns.clone(), rows)?;
                    let out = pq_operators::apply(&table, op, &empty_deps)?;
                    self.columns = out.columns().to_vec();
                    rows = out.iter_rows().collect();
                }
                _ => unreachable!("step state does not match its operator"),
            }
            if done {
                break;
            }
        }
        Ok(BatchOutput { rows, done })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{CompareOp, Comparison, Predicate};

    fn col(name: &str) -> Column {
        Column::any(name)
    }

    #[test]
    fn filter_runs_per_batch() {
        let mut p = Pipeline::new(
            vec![QueryOperation::FilterRows {
                predicate: Predicate::Comparison(Comparison {
                    column: "a".into(),
                    op: CompareOp::Gt,
                    value: Some(Value::Int(1)),
                    case_sensitive: None,
                }),
            }],
            vec![col("a")],
        );
        let out = p.transform_batch(vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert!(!out.done);
    }

    #[test]
    fn take_signals_done_once_satisfied_across_batches() {
        let mut p = Pipeline::new(vec![QueryOperation::Take { n: 3 }], vec![col("a")]);
        let first = p.transform_batch(vec![vec![Value::Int(1)], vec![Value::Int(2)]]).unwrap();
        assert_eq!(first.rows.len(), 2);
        assert!(!first.done);
        let second = p.transform_batch(vec![vec![Value::Int(3)], vec![Value::Int(4)]]).unwrap();
        assert_eq!(second.rows.len(), 1);
        assert!(second.done);
    }

    #[test]
    fn add_index_column_counter_survives_batch_boundaries() {
        let mut p = Pipeline::new(
            vec![QueryOperation::AddIndexColumn { name: "idx".into(), initial: 0, increment: 1 }],
            vec![col("a")],
        );
        let first = p.transform_batch(vec![vec![Value::Int(10)], vec![Value::Int(20)]]).unwrap();
        assert_eq!(first.rows[0][1], Value::Int(0));
        assert_eq!(first.rows[1][1], Value::Int(1));
        let second = p.transform_batch(vec![vec![Value::Int(30)]]).unwrap();
        assert_eq!(second.rows[0][1], Value::Int(2));
    }

    #[test]
    fn promote_headers_consumes_first_row_of_the_stream() {
        let mut p = Pipeline::new(vec![QueryOperation::PromoteHeaders], vec![col("Column1"), col("Column2")]);
        let out = p
            .transform_batch(vec![
                vec![Value::Text("name".into()), Value::Text("age".into())],
                vec![Value::Text("Ada".into()), Value::Int(30)],
            ])
            .unwrap();
        assert_eq!(p.columns()[0].name, "name");
        assert_eq!(out.rows.len(), 1);
    }
}
