//! On-disk spill plumbing shared by the external-memory sort/group/merge
//! operators (§4.5). Rows are newline-delimited JSON, one row per line, so a
//! run can be read back lazily instead of loading the whole file.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use pq_common::{PqError, Value};
use tempfile::TempDir;

fn io_err(context: &str, e: std::io::Error) -> PqError {
    PqError::Spill(format!("{context}: {e}"))
}

/// A scratch directory for one operator instance, removed on drop. The
/// spec's shared-resource policy scopes the spill directory to a single
/// operator instance and requires cleanup on completion or cancellation;
/// `TempDir`'s `Drop` gives us that for free, including the cancel path.
pub struct SpillArena {
    dir: TempDir,
    next_id: u64,
}

impl SpillArena {
    pub fn new() -> Result<Self, PqError> {
        let dir = tempfile::tempdir().map_err(|e| io_err("failed to create spill directory", e))?;
        Ok(Self { dir, next_id: 0 })
    }

    fn fresh_path(&mut self, prefix: &str) -> PathBuf {
        let id = self.next_id;
        self.next_id += 1;
        self.dir.path().join(format!("{prefix}-{id}.ndjson"))
    }

    /// Writes `rows` to a new file in the arena and returns a handle that
    /// can be read back via [`SpillRun::open`].
    pub fn write_run(&mut self, prefix: &str, rows: &[Vec<Value>]) -> Result<SpillRun, PqError> {
        let path = self.fresh_path(prefix);
        let file = File::create(&path).map_err(|e| io_err("failed to create spill run", e))?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut writer, row).map_err(|e| PqError::Spill(e.to_string()))?;
            writer.write_all(b"\n").map_err(|e| io_err("failed to write spill run", e))?;
        }
        writer.flush().map_err(|e| io_err("failed to flush spill run", e))?;
        Ok(SpillRun { path, len: rows.len() })
    }
}

/// A handle to one spilled run of rows, reopenable for sequential reads.
pub struct SpillRun {
    path: PathBuf,
    len: usize,
}

impl SpillRun {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn open(&self) -> Result<SpillReader, PqError> {
        let file = File::open(&self.path).map_err(|e| io_err("failed to open spill run", e))?;
        Ok(SpillReader { lines: BufReader::new(file).lines() })
    }
}

/// Sequential reader over one spilled run; yields rows in the order they
/// were written.
pub struct SpillReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl Iterator for SpillReader {
    type Item = Result<Vec<Value>, PqError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        let line = match line {
            Ok(l) => l,
            Err(e) => return Some(Err(io_err("failed to read spill run", e))),
        };
        Some(serde_json::from_str(&line).map_err(|e| PqError::Spill(e.to_string())))
    }
}

impl SpillArena {
    /// Appends one `(key, row)` entry to a fan-out bucket file, creating it
    /// on first use. Used by group-by spill, where entries trickle in one
    /// row at a time rather than as a single completed run.
    pub fn append_bucket_entry(&self, bucket: u64, key: &str, row: &[Value]) -> Result<(), PqError> {
        let path = self.bucket_path(bucket);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err("failed to open bucket file", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &(key, row)).map_err(|e| PqError::Spill(e.to_string()))?;
        writer.write_all(b"\n").map_err(|e| io_err("failed to write bucket entry", e))?;
        writer.flush().map_err(|e| io_err("failed to flush bucket entry", e))
    }

    pub fn bucket_path(&self, bucket: u64) -> PathBuf {
        self.dir.path().join(format!("bucket-{bucket}.ndjson"))
    }

    pub fn read_bucket(&self, bucket: u64) -> Result<BucketReader, PqError> {
        let path = self.bucket_path(bucket);
        match File::open(&path) {
            Ok(file) => Ok(BucketReader { lines: Some(BufReader::new(file).lines()) }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BucketReader { lines: None }),
            Err(e) => Err(io_err("failed to open bucket file", e)),
        }
    }
}

pub struct BucketReader {
    lines: Option<std::io::Lines<BufReader<File>>>,
}

impl Iterator for BucketReader {
    type Item = Result<(String, Vec<Value>), PqError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.as_mut()?.next()?;
        let line = match line {
            Ok(l) => l,
            Err(e) => return Some(Err(io_err("failed to read bucket file", e))),
        };
        Some(serde_json::from_str(&line).map_err(|e| PqError::Spill(e.to_string())))
    }
}
