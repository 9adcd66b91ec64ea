//! Drives a [`Pipeline`] from a pull-based row producer, emitting
//! fixed-size `batch_size` batches to an `on_batch` callback (§4.4).
//! Buffering is a single overflow buffer with an in-place read offset —
//! rows are appended at the tail and consumed from a moving offset near
//! the head, so a steady-state run only ever copies a batch's worth of
//! rows per emit instead of shifting the whole buffer.

use pq_common::{CancelToken, PqError, Value};

use crate::pipeline::Pipeline;

struct OverflowBuffer {
    rows: Vec<Vec<Value>>,
    offset: usize,
}

impl OverflowBuffer {
    fn new() -> Self {
        Self { rows: Vec::new(), offset: 0 }
    }

    fn push_all(&mut self, mut new_rows: Vec<Vec<Value>>) {
        self.rows.append(&mut new_rows);
    }

    fn len(&self) -> usize {
        self.rows.len() - self.offset
    }

    fn take_batch(&mut self, n: usize) -> Vec<Vec<Value>> {
        let end = self.offset + n;
        let batch = self.rows[self.offset..end].to_vec();
        self.offset = end;
        self.maybe_compact();
        batch
    }

    fn maybe_compact(&mut self) {
        if self.offset > 0 && self.offset * 2 >= self.rows.len() {
            self.rows.drain(0..self.offset);
            self.offset = 0;
        }
    }

    fn drain_remaining(&mut self) -> Vec<Vec<Value>> {
        let rest = self.rows[self.offset..].to_vec();
        self.rows.clear();
        self.offset = 0;
        rest
    }
}

/// Pulls chunks from `produce` (returning `None` at end of input), feeds
/// each through `pipeline`, and calls `on_batch` once per `batch_size`
/// rows (plus one final, possibly short, batch for the remainder).
/// Returns the total row count emitted — used to verify streaming
/// equivalence (I7) against the materializing path.
pub fn run_pipeline(
    pipeline: &mut Pipeline,
    mut produce: impl FnMut() -> Option<Vec<Vec<Value>>>,
    batch_size: usize,
    cancel: &CancelToken,
    mut on_batch: impl FnMut(Vec<Vec<Value>>),
) -> Result<usize, PqError> {
    assert!(batch_size > 0, "batch_size must be positive");
    let mut buffer = OverflowBuffer::new();
    let mut total = 0;

    loop {
        cancel.check()?;
        match produce() {
            Some(chunk) => {
                let out = pipeline.transform_batch(chunk)?;
                buffer.push_all(out.rows);
                while buffer.len() >= batch_size {
                    let batch = buffer.take_batch(batch_size);
                    total += batch.len();
                    on_batch(batch);
                    cancel.check()?;
                }
                if out.done {
                    break;
                }
            }
            None => {
                let out = pipeline.transform_batch(vec![])?;
                buffer.push_all(out.rows);
                break;
            }
        }
    }

    while buffer.len() >= batch_size {
        let batch = buffer.take_batch(batch_size);
        total += batch.len();
        on_batch(batch);
    }
    let rest = buffer.drain_remaining();
    if !rest.is_empty() {
        total += rest.len();
        on_batch(rest);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, QueryOperation};

    #[test]
    fn emits_fixed_size_batches_and_one_remainder() {
        let mut pipeline = Pipeline::new(vec![], vec![Column::any("a")]);
        let mut chunks = vec![
            (0..5).map(|i| vec![Value::Int(i)]).collect::<Vec<_>>(),
            (5..7).map(|i| vec![Value::Int(i)]).collect::<Vec<_>>(),
        ]
        .into_iter();
        let mut batches = Vec::new();
        let total = run_pipeline(
            &mut pipeline,
            || chunks.next(),
            3,
            &CancelToken::new(),
            |b| batches.push(b.len()),
        )
        .unwrap();
        assert_eq!(total, 7);
        assert_eq!(batches, vec![3, 3, 1]);
    }

    #[test]
    fn take_stops_the_producer_loop_early() {
        let mut pipeline = Pipeline::new(vec![QueryOperation::Take { n: 2 }], vec![Column::any("a")]);
        let mut chunks = vec![(0..10).map(|i| vec![Value::Int(i)]).collect::<Vec<_>>()].into_iter();
        let mut seen = 0;
        let total = run_pipeline(&mut pipeline, || chunks.next(), 5, &CancelToken::new(), |b| seen += b.len()).unwrap();
        assert_eq!(total, 2);
        assert_eq!(seen, 2);
    }

    #[test]
    fn cancellation_is_observed_between_batches() {
        let mut pipeline = Pipeline::new(vec![], vec![Column::any("a")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut chunks = vec![vec![vec![Value::Int(1)]]].into_iter();
        let err = run_pipeline(&mut pipeline, || chunks.next(), 1, &cancel, |_| {});
        assert!(err.is_err());
    }
}
