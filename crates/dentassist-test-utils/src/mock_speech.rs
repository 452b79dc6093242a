// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock speech recogniser with canned transcriptions and a call counter.
//!
//! The counter is what single-flight tests assert on: two identical uploads
//! in flight must reach the backend exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use dentassist_core::{DentassistError, SpeechRecognizer};

const DEFAULT_TRANSCRIPTION: &str = "Douleur molaire 36 depuis trois jours, sensible au froid.";

/// A mock recogniser returning a fixed transcription.
pub struct MockSpeech {
    transcription: String,
    delay: Duration,
    calls: AtomicU64,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self::with_transcription(DEFAULT_TRANSCRIPTION)
    }

    pub fn with_transcription(text: impl Into<String>) -> Self {
        Self {
            transcription: text.into(),
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// Hold each call for `delay`, so concurrent uploads overlap in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of backend calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for MockSpeech {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _extension: &str,
        _language_hint: Option<&str>,
    ) -> Result<String, DentassistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.transcription.clone())
    }

    async fn ready(&self) -> bool {
        true
    }
}
