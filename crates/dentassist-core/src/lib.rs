// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the dentassist backend.
//!
//! Provides the error taxonomy, domain types, and the model capability ports
//! the rest of the workspace is written against.

pub mod error;
pub mod ports;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DentassistError;
pub use ports::{
    GenerationParams, GenerativeModel, SpeechRecognizer, TextEmbedder, TokenChunk, TokenStream,
};
pub use types::{
    note_digest, AuditAction, AuditEntry, AuditOutcome, ConsultationRecord, HardwareProfile,
    IndexKind, KnowledgeDoc,
};
