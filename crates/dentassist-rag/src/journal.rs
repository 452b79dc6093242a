// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only JSONL journal for consultation records.
//!
//! Every consultation is written here before it is indexed. If the vector
//! index corrupts or disappears, this file is the authoritative backup the
//! coordinator rebuilds from. It deliberately lives outside `rag_data/` so
//! wiping the index directory cannot destroy the journal.
//!
//! Append is atomic at line granularity: a record counts only once its
//! newline hit the disk. A trailing unterminated line -- the footprint of a
//! crash mid-write -- is detected and skipped on scan.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dentassist_core::{ConsultationRecord, DentassistError};

/// Durable, single-writer consultation journal.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
    skipped_lines: AtomicU64,
}

impl Journal {
    /// Opens (creating if absent) the journal at `path`.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            skipped_lines: AtomicU64::new(0),
        })
    }

    /// Appends one record and fsyncs before returning.
    ///
    /// Once this returns `Ok`, the record survives a crash.
    pub fn append(&self, record: &ConsultationRecord) -> Result<(), DentassistError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| DentassistError::StoragePersist(format!("encode record: {e}")))?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())
            .map_err(|e| DentassistError::StoragePersist(format!("journal write: {e}")))?;
        file.sync_data()
            .map_err(|e| DentassistError::StoragePersist(format!("journal fsync: {e}")))
    }

    /// Reads every record in insertion order.
    ///
    /// Partial lines (crash footprints) and malformed lines are skipped and
    /// counted rather than failing the scan.
    pub fn scan(&self) -> Vec<ConsultationRecord> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        let mut rest = content.as_str();
        while let Some(newline) = rest.find('\n') {
            let line = &rest[..newline];
            rest = &rest[newline + 1..];
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConsultationRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    self.skipped_lines.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "skipping malformed journal line");
                }
            }
        }
        // Anything after the final newline never finished being written.
        if !rest.trim().is_empty() {
            self.skipped_lines.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("skipping unterminated trailing journal line");
        }
        records
    }

    /// Full export, insertion order. Alias for [`scan`](Self::scan) kept for
    /// the wire surface.
    pub fn export(&self) -> Vec<ConsultationRecord> {
        self.scan()
    }

    /// Number of valid records currently on disk.
    pub fn count(&self) -> usize {
        self.scan().len()
    }

    /// Lines skipped across all scans since startup (metrics surface).
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
