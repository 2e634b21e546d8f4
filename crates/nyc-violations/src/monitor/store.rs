use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::domain::{KnownViolationEntry, Source, ViolationKey};

const HEADER: [&str; 6] = ["source", "native_id", "first_seen", "block", "lot", "issued_date"];

/// Durable set of violations that have already been reported.
pub trait KnownViolationStore {
    fn contains(&self, key: &ViolationKey) -> bool;
    /// Persists `entry` before returning. Marking a known key is a no-op.
    fn mark_seen(&mut self, entry: KnownViolationEntry) -> Result<(), StoreError>;
    fn entries(&self) -> Vec<KnownViolationEntry>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("known-violations store {} is not accessible: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("known-violations store {} could not be written: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("known-violations store {} does not start with the expected header", .path.display())]
    UnrecognizedHeader { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    source: Source,
    native_id: String,
    first_seen: DateTime<Utc>,
    block: String,
    lot: String,
    issued_date: Option<NaiveDate>,
}

impl From<&KnownViolationEntry> for LedgerRow {
    fn from(entry: &KnownViolationEntry) -> Self {
        Self {
            source: entry.source,
            native_id: entry.native_id.clone(),
            first_seen: entry.first_seen,
            block: entry.block.clone(),
            lot: entry.lot.clone(),
            issued_date: entry.issued_date,
        }
    }
}

impl From<LedgerRow> for KnownViolationEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            source: row.source,
            native_id: row.native_id,
            first_seen: row.first_seen,
            block: row.block,
            lot: row.lot,
            issued_date: row.issued_date,
        }
    }
}

/// Append-only CSV ledger. Every mark is flushed and synced before returning,
/// so an interrupted run leaves exactly the marks it had completed.
#[derive(Debug)]
pub struct CsvViolationLedger {
    path: PathBuf,
    known: HashSet<ViolationKey>,
    entries: Vec<KnownViolationEntry>,
    writer: csv::Writer<File>,
}

impl CsvViolationLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_error)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).map_err(io_error)?;

        let header_line = HEADER.join(",");
        let entries = if contents.is_empty() || header_line.as_bytes().starts_with(&contents) {
            // Empty, or a header torn mid-write: start over.
            file.set_len(0).map_err(io_error)?;
            writeln!(file, "{header_line}").map_err(io_error)?;
            file.sync_data().map_err(io_error)?;
            Vec::new()
        } else {
            let first_line = contents.split(|byte| *byte == b'\n').next().unwrap_or_default();
            if trim_line_end(first_line) != header_line.as_bytes() {
                return Err(StoreError::UnrecognizedHeader { path: path.clone() });
            }
            if contents.last() != Some(&b'\n') {
                warn!(path = %path.display(), "ledger ends with a partial row; realigning");
                file.write_all(b"\n").map_err(io_error)?;
                file.sync_data().map_err(io_error)?;
            }
            read_entries(&path, &contents)
        };

        let known = entries.iter().map(KnownViolationEntry::key).collect();
        debug!(path = %path.display(), entries = entries.len(), "opened known-violations ledger");

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        Ok(Self {
            path,
            known,
            entries,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KnownViolationStore for CsvViolationLedger {
    fn contains(&self, key: &ViolationKey) -> bool {
        self.known.contains(key)
    }

    fn mark_seen(&mut self, entry: KnownViolationEntry) -> Result<(), StoreError> {
        let key = entry.key();
        if self.known.contains(&key) {
            return Ok(());
        }

        self.writer
            .serialize(LedgerRow::from(&entry))
            .map_err(|source| StoreError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_data())
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        self.known.insert(key);
        self.entries.push(entry);
        Ok(())
    }

    fn entries(&self) -> Vec<KnownViolationEntry> {
        self.entries.clone()
    }
}

fn read_entries(path: &Path, contents: &[u8]) -> Vec<KnownViolationEntry> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents);
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for (index, row) in reader.deserialize::<LedgerRow>().enumerate() {
        match row {
            Ok(row) => {
                let entry = KnownViolationEntry::from(row);
                if seen.insert(entry.key()) {
                    entries.push(entry);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), row = index + 1, error = %err, "skipping unreadable ledger row");
            }
        }
    }

    entries
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
