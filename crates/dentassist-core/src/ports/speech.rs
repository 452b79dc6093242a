// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech recognition port.

use async_trait::async_trait;

use crate::error::DentassistError;

/// Transcribes recorded consultation audio to text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe an audio payload.
    ///
    /// `extension` is the lower-case file extension without the dot (already
    /// validated by the caller). `language_hint` is an ISO 639-1 code passed
    /// through to the backend when present.
    ///
    /// Fails with [`DentassistError::ModelNotReady`] when weights are absent
    /// or the recogniser has not finished loading.
    async fn transcribe(
        &self,
        audio: &[u8],
        extension: &str,
        language_hint: Option<&str>,
    ) -> Result<String, DentassistError>;

    /// Whether the recogniser can serve requests right now.
    async fn ready(&self) -> bool;
}
