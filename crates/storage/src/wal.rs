// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of events.
//!
//! One JSON document per line, each wrapping an event with its sequence
//! number. Appends are buffered; `flush` is the durability point (group
//! commit). A torn final line from a crash mid-write is dropped on open.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_core::Event;
use tracing::warn;

/// WAL errors
#[derive(Debug, Error)]
pub enum WalError {
    #[error("WAL io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single WAL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only event log.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Highest sequence number ever appended.
    write_seq: u64,
    /// Highest sequence number the caller has marked processed.
    processed_seq: u64,
    /// Entries appended (or found on open) but not yet handed out.
    unread: VecDeque<WalEntry>,
}

impl Wal {
    /// Open (or create) the WAL at `path`.
    ///
    /// Entries with `seq > processed_seq` are queued for
    /// [`next_unprocessed`](Self::next_unprocessed). A corrupt trailing line
    /// (torn write from a crash) is logged and truncated away so subsequent
    /// appends start on a clean line.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        let (existing, valid_len) = read_entries(path)?;
        let write_seq = existing.last().map(|e| e.seq).unwrap_or(processed_seq);
        let unread = existing.into_iter().filter(|e| e.seq > processed_seq).collect();

        // Chop any torn tail before reopening for append
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > valid_len {
                warn!(path = %path.display(), from = meta.len(), to = valid_len,
                    "truncating torn WAL tail");
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            write_seq: write_seq.max(processed_seq),
            processed_seq,
            unread,
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append an event, returning its sequence number.
    ///
    /// Buffered — call [`flush`](Self::flush) to make it durable.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let line = serde_json::to_string(&entry)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.write_seq = seq;
        self.unread.push_back(entry);
        Ok(seq)
    }

    /// Flush buffered appends to the OS and fsync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Next entry not yet handed to the caller, in sequence order.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        Ok(self.unread.pop_front())
    }

    /// Record that everything up to `seq` has been applied.
    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// All durable entries with `seq > after`, read back from disk.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let (entries, _) = read_entries(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Drop entries with `seq < before` from disk (post-checkpoint compaction).
    ///
    /// Rewrites the log atomically via a temp file.
    pub fn truncate_before(&mut self, before: u64) -> Result<(), WalError> {
        self.flush()?;
        let (entries, _) = read_entries(&self.path)?;
        let keep: Vec<WalEntry> = entries.into_iter().filter(|e| e.seq >= before).collect();

        let tmp = self.path.with_extension("wal.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for entry in &keep {
                let line = serde_json::to_string(entry)?;
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_data()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Read every parseable entry from the log file.
///
/// Returns the entries and the byte length of the valid prefix. A parse
/// failure stops the read: the final line torn by a crash is the expected
/// case, and anything after mid-file corruption cannot be trusted either —
/// the snapshot is the fallback.
fn read_entries(path: &Path) -> Result<(Vec<WalEntry>, u64), std::io::Error> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    let mut valid_len: u64 = 0;
    let reader = BufReader::new(file);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            valid_len += line.len() as u64 + 1;
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) => {
                entries.push(entry);
                valid_len += line.len() as u64 + 1;
            }
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e,
                    "dropping unparseable WAL tail");
                break;
            }
        }
    }
    Ok((entries, valid_len))
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
