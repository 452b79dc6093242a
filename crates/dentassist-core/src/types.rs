// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the dentassist workspace.

use chrono::{DateTime, SecondsFormat, Utc};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Hardware capacity class detected once at startup.
///
/// Advisory only: the scheduler and runtime consult it for worker counts and
/// layer-offload defaults, nothing else enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HardwareProfile {
    HighVram,
    LowVram,
    CpuOnly,
}

/// Which collection an indexed item belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Consultation,
    Knowledge,
}

/// A completed consultation: transcription plus the generated SmartNote.
///
/// Journal records are append-only and never mutated; `digest` identifies a
/// note body, so replays and double-saves collapse during index rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRecord {
    /// Correlation id of the request that produced the note.
    pub correlation_id: String,
    /// Creation instant, UTC with millisecond precision.
    pub created_at: DateTime<Utc>,
    /// Opaque caller-supplied patient identifier; never parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Dentist display name.
    #[serde(default)]
    pub dentist_name: String,
    /// Consultation type tag (free-form, e.g. "urgence", "contrôle").
    #[serde(default)]
    pub consultation_type: String,
    /// Raw transcription text the note was generated from.
    #[serde(default)]
    pub transcription: String,
    /// The generated SmartNote body.
    pub note: String,
    /// SHA-256 hex digest over the note body.
    pub digest: String,
}

impl ConsultationRecord {
    /// Builds a record for a freshly generated note, stamping `created_at`
    /// and deriving the digest from the note body.
    pub fn new(correlation_id: impl Into<String>, note: impl Into<String>) -> Self {
        let note = note.into();
        Self {
            correlation_id: correlation_id.into(),
            created_at: Utc::now(),
            patient_id: None,
            dentist_name: String::new(),
            consultation_type: String::new(),
            transcription: String::new(),
            digest: note_digest(&note),
            note,
        }
    }

    /// RFC 3339 timestamp with millisecond precision, for wire responses.
    pub fn created_at_rfc3339(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// SHA-256 hex digest over a note body.
pub fn note_digest(note: &str) -> String {
    hex::encode(digest(&SHA256, note.as_bytes()))
}

/// A seed knowledge passage, write-once at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDoc {
    /// Stable document id.
    pub id: String,
    /// Where the passage came from (guideline name, path, URI).
    pub source: String,
    /// Section title within the source.
    pub section: String,
    /// Passage body.
    pub body: String,
}

/// Action tags for the audit trail. Upper-case verbs on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Transcribe,
    Summarize,
    SummarizeStream,
    SummarizeRag,
    SummarizeStreamRag,
    ConsultationSave,
    ConsultationSearch,
    ConsultationExport,
    AuditRead,
    ModelDownload,
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One line of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UTC instant the entry was written.
    pub timestamp: DateTime<Utc>,
    /// What was done.
    pub action: AuditAction,
    /// Who did it: dentist name when the request carries one, else "local-user".
    pub actor: String,
    /// What was acted on: patient id, filename, "all", ...
    pub resource: String,
    /// Correlation id of the originating request.
    pub correlation_id: String,
    /// How it ended.
    pub outcome: AuditOutcome,
    /// Free-form context, truncated by the writer.
    #[serde(default)]
    pub detail: String,
}
