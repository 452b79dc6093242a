// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only JSONL audit trail for all actions touching patient data.
//!
//! Every create/read/export on patient data is logged with who performed the
//! action, what they did, and when. This is intentionally separate from the
//! operational metrics surface, which tracks HTTP behaviour -- not user
//! intent.
//!
//! File permissions are `0o600`: the log contains patient identifiers, only
//! the owning user may read it. Writes are serialised through an internal
//! lock and flushed per line; the log is never mutated and never rotated by
//! the backend.
//!
//! A failed write never aborts the caller's operation. It is logged and
//! counted so the metrics surface can report it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use dentassist_core::{AuditAction, AuditEntry, AuditOutcome};

/// Detail strings are clipped so one noisy error cannot bloat the log.
const MAX_DETAIL_CHARS: usize = 500;

/// Append-only audit log with owner-only file permissions.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
    write_failures: AtomicU64,
}

impl AuditLog {
    /// Opens (creating if absent) the audit log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            write_failures: AtomicU64::new(0),
        })
    }

    /// Appends a single audit record.
    ///
    /// Never fails the caller: write errors are logged and counted.
    pub fn record(
        &self,
        action: AuditAction,
        actor: &str,
        resource: &str,
        correlation_id: &str,
        outcome: AuditOutcome,
        detail: &str,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            action,
            actor: if actor.is_empty() {
                "local-user".to_string()
            } else {
                actor.to_string()
            },
            resource: resource.to_string(),
            correlation_id: correlation_id.to_string(),
            outcome,
            detail: clip(detail),
        };

        if let Err(err) = self.append_line(&entry) {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                error = %err,
                action = %action,
                resource,
                "failed to write audit record"
            );
        }
    }

    /// Returns up to `n` newest entries, newest first.
    ///
    /// Malformed lines (partial writes from a crash) are skipped.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<AuditEntry>(line).ok())
            .take(n)
            .collect()
    }

    /// Number of audit writes that failed since startup.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

fn clip(detail: &str) -> String {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        detail.to_string()
    } else {
        detail.chars().take(MAX_DETAIL_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn open_temp() -> (tempfile::TempDir, AuditLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        (dir, log)
    }

    #[test]
    fn record_then_recent_round_trips() {
        let (_dir, log) = open_temp();
        log.record(
            AuditAction::Summarize,
            "Dr Lefèvre",
            "transcription",
            "req-1",
            AuditOutcome::Success,
            "",
        );
        log.record(
            AuditAction::ConsultationSave,
            "",
            "P-007",
            "req-2",
            AuditOutcome::Failure,
            "disk full",
        );

        let entries = log.recent(10);
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].action, AuditAction::ConsultationSave);
        assert_eq!(entries[0].outcome, AuditOutcome::Failure);
        assert_eq!(entries[0].actor, "local-user");
        assert_eq!(entries[1].actor, "Dr Lefèvre");
    }

    #[test]
    fn recent_bounds_and_skips_malformed() {
        let (dir, log) = open_temp();
        for i in 0..5 {
            log.record(
                AuditAction::Transcribe,
                "dr",
                &format!("file-{i}.wav"),
                &format!("req-{i}"),
                AuditOutcome::Success,
                "",
            );
        }
        // Simulate a torn write.
        {
            let mut f = OpenOptions::new()
                .append(true)
                .open(dir.path().join("audit.jsonl"))
                .unwrap();
            f.write_all(b"{\"timestamp\":\"2026-01-").unwrap();
        }

        let entries = log.recent(3);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].resource, "file-4.wav");
    }

    #[test]
    fn detail_is_clipped() {
        let (_dir, log) = open_temp();
        let noisy = "x".repeat(2000);
        log.record(
            AuditAction::Summarize,
            "dr",
            "transcription",
            "req-1",
            AuditOutcome::Failure,
            &noisy,
        );
        let entries = log.recent(1);
        assert_eq!(entries[0].detail.len(), MAX_DETAIL_CHARS);
    }

    #[test]
    #[cfg(unix)]
    fn file_permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, log) = open_temp();
        log.record(
            AuditAction::AuditRead,
            "dr",
            "all",
            "req-1",
            AuditOutcome::Success,
            "",
        );
        let mode = std::fs::metadata(dir.path().join("audit.jsonl"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
