//! Shared CSV output for all workers.
//!
//! One append = one lock acquisition: header check, rows, flush. The lock is
//! never held across a task's retry loop.

use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::{SweepError, SweepResult};
use crate::core::types::HotelRecord;

/// Destination for accepted batches.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one batch atomically with respect to other appends. Returns the
    /// number of rows written.
    async fn append(&self, records: &[HotelRecord]) -> SweepResult<usize>;
}

pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn append(&self, records: &[HotelRecord]) -> SweepResult<usize> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let rows = records.to_vec();
        tokio::task::spawn_blocking(move || append_locked(&path, &rows))
            .await
            .map_err(|e| SweepError::Io(io::Error::other(e)))?
    }
}

/// Append under an OS advisory lock so separate processes cannot interleave.
fn append_locked(path: &Path, records: &[HotelRecord]) -> SweepResult<usize> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?;
    file.lock_exclusive()?;
    let result = write_rows(&file, path, records);
    let _ = FileExt::unlock(&file);
    result
}

fn write_rows(file: &File, path: &Path, records: &[HotelRecord]) -> SweepResult<usize> {
    let fresh = file.metadata()?.len() == 0;
    if !fresh {
        validate_header(file, path)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    debug!(
        "Appended {} rows to {} (header written: {})",
        records.len(),
        path.display(),
        fresh && !records.is_empty()
    );
    Ok(records.len())
}

/// An existing file must carry exactly the record columns, in order.
///
/// Reads through the locked handle, never by path, so the checked file is the
/// one being appended to. Append mode keeps writes at the end after the seek.
fn validate_header(file: &File, path: &Path) -> SweepResult<()> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(0))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(handle);
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found.iter().map(String::as_str).eq(HotelRecord::COLUMNS.iter().copied()) {
        return Ok(());
    }
    Err(SweepError::SchemaMismatch {
        path: path.display().to_string(),
        expected: HotelRecord::COLUMNS.join(","),
        found: found.join(","),
    })
}

/// Start the run on a clean destination: remove any stale file of the same
/// name and make sure the directory exists.
pub fn prepare_output(path: &Path) -> SweepResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
        info!("🗑️ Removed stale output file {}", path.display());
    }
    Ok(())
}

/// Data rows currently in `path`; a missing file has none.
pub fn count_rows(path: &Path) -> SweepResult<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = 0;
    for row in reader.records() {
        row?;
        rows += 1;
    }
    Ok(rows)
}
