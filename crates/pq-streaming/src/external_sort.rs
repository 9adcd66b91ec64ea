//! External-memory sort (§4.5). Accumulates input rows; once the running
//! count exceeds `max_in_memory_rows`, in-memory runs are sorted and spilled
//! to disk, and the result is produced by a k-way merge over the spilled
//! runs (plus whatever remains in memory) on completion. Below the
//! threshold this degrades to a single in-memory sort, identical to
//! `pq_operators::sort::sort_rows`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use pq_common::{Column, PqError, SortKey, Table, Value};
use pq_operators::sort::{compare_rows, resolve_keys};

use crate::spill::{SpillArena, SpillReader, SpillRun};

pub struct ExternalSorter {
    columns: Vec<Column>,
    sort_by: Vec<SortKey>,
    max_in_memory_rows: usize,
    buffer: Vec<Vec<Value>>,
    runs: Vec<SpillRun>,
    arena: Option<SpillArena>,
    spilled: bool,
}

impl ExternalSorter {
    pub fn new(columns: Vec<Column>, sort_by: Vec<SortKey>, max_in_memory_rows: usize) -> Self {
        Self {
            columns,
            sort_by,
            max_in_memory_rows: max_in_memory_rows.max(1),
            buffer: Vec::new(),
            runs: Vec::new(),
            arena: None,
            spilled: false,
        }
    }

    /// True the first time this call causes a spill; callers use this to
    /// raise a one-shot `stream:spill { operator: "sort" }` event.
    pub fn push_rows(&mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Result<bool, PqError> {
        self.buffer.extend(rows);
        if self.buffer.len() < self.max_in_memory_rows {
            return Ok(false);
        }
        self.flush_run()?;
        Ok(!self.spilled && {
            self.spilled = true;
            true
        })
    }

    fn flush_run(&mut self) -> Result<(), PqError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let idx = self.key_index()?;
        let mut run = std::mem::take(&mut self.buffer);
        run.sort_by(|a, b| compare_rows(a, b, &idx));
        let arena = self.arena.get_or_insert_with(|| SpillArena::new().expect("spill arena"));
        let spilled = arena.write_run("sort", &run)?;
        self.runs.push(spilled);
        Ok(())
    }

    fn key_index(&self) -> Result<Vec<(usize, &SortKey)>, PqError> {
        key_index_for(&self.columns, &self.sort_by)
    }

    /// Consumes the sorter and produces the fully sorted row sequence.
    /// Ties within and across runs preserve each run's own stable order,
    /// since every run was itself produced by a stable sort and the merge
    /// only ever breaks ties by run/position, never by value.
    pub fn finish(mut self) -> Result<Vec<Vec<Value>>, PqError> {
        if self.runs.is_empty() {
            let mut buffer = std::mem::take(&mut self.buffer);
            let idx = self.key_index()?;
            buffer.sort_by(|a, b| compare_rows(a, b, &idx));
            return Ok(buffer);
        }
        self.flush_run()?;
        merge_runs(&self.columns, &self.sort_by, &self.runs)
    }
}

fn key_index_for<'a>(columns: &[Column], sort_by: &'a [SortKey]) -> Result<Vec<(usize, &'a SortKey)>, PqError> {
    let probe = Table::new(columns.to_vec(), vec![])?;
    resolve_keys(&probe, sort_by)
}

/// One candidate row at the head of a run, ordered by `compare_rows` with
/// `(run, seq)` as the tie-break so rows that compare equal come out in
/// run-then-position order — each run was written in stable sorted order,
/// so this preserves the original input order among equal keys, matching
/// `pq_operators::sort::sort_rows`'s stability.
struct HeapEntry<'a> {
    row: Vec<Value>,
    run: usize,
    seq: u64,
    idx: &'a [(usize, &'a SortKey)],
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry<'_> {}
impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_rows(&self.row, &other.row, self.idx).then_with(|| (self.run, self.seq).cmp(&(other.run, other.seq)))
    }
}

fn merge_runs(columns: &[Column], sort_by: &[SortKey], runs: &[SpillRun]) -> Result<Vec<Vec<Value>>, PqError> {
    let probe = Table::new(columns.to_vec(), vec![])?;
    let idx = resolve_keys(&probe, sort_by)?;

    let mut readers: Vec<SpillReader> = runs.iter().map(|r| r.open()).collect::<Result<_, _>>()?;
    let mut seqs = vec![0u64; readers.len()];
    let mut heap: BinaryHeap<std::cmp::Reverse<HeapEntry>> = BinaryHeap::new();

    for (run_idx, reader) in readers.iter_mut().enumerate() {
        if let Some(row) = reader.next() {
            heap.push(std::cmp::Reverse(HeapEntry { row: row?, run: run_idx, seq: 0, idx: &idx }));
            seqs[run_idx] = 1;
        }
    }

    let mut out = Vec::with_capacity(runs.iter().map(SpillRun::len).sum());
    while let Some(std::cmp::Reverse(entry)) = heap.pop() {
        if let Some(next) = readers[entry.run].next() {
            let seq = seqs[entry.run];
            seqs[entry.run] += 1;
            heap.push(std::cmp::Reverse(HeapEntry { row: next?, run: entry.run, seq, idx: &idx }));
        }
        out.push(entry.row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Column, Direction, NullsOrder};

    fn key() -> Vec<SortKey> {
        vec![SortKey { column: "a".into(), direction: Direction::Asc, nulls: NullsOrder::Last }]
    }

    #[test]
    fn below_threshold_never_spills() {
        let mut sorter = ExternalSorter::new(vec![Column::any("a")], key(), 100);
        let spilled = sorter.push_rows(vec![vec![Value::Int(3)], vec![Value::Int(1)], vec![Value::Int(2)]]).unwrap();
        assert!(!spilled);
        let out = sorter.finish().unwrap();
        let vals: Vec<_> = out.into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(vals, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn above_threshold_spills_and_merges_sorted() {
        let mut sorter = ExternalSorter::new(vec![Column::any("a")], key(), 2);
        let mut spilled_once = false;
        for batch in [vec![5, 1], vec![4, 2], vec![3]] {
            let rows = batch.into_iter().map(|i| vec![Value::Int(i)]).collect::<Vec<_>>();
            if sorter.push_rows(rows).unwrap() {
                spilled_once = true;
            }
        }
        assert!(spilled_once);
        let out = sorter.finish().unwrap();
        let vals: Vec<_> = out.into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(vals, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]);
    }
}
