// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Not-ready stand-ins for backends that could not be constructed.
//!
//! Selected at startup when a runtime dependency is absent (e.g. the `onnx`
//! feature is compiled out). Every call fails with the matching prerequisite
//! error, so callers see the same taxonomy as with real backends whose
//! weights are missing.

use async_trait::async_trait;

use dentassist_core::{
    DentassistError, GenerationParams, GenerativeModel, SpeechRecognizer, TextEmbedder,
    TokenStream,
};

/// Recogniser stand-in; always `model/not_ready`.
pub struct NotReadyRecognizer;

#[async_trait]
impl SpeechRecognizer for NotReadyRecognizer {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _extension: &str,
        _language_hint: Option<&str>,
    ) -> Result<String, DentassistError> {
        Err(DentassistError::ModelNotReady(
            "speech recogniser not configured".into(),
        ))
    }

    async fn ready(&self) -> bool {
        false
    }
}

/// Generator stand-in; always `model/not_ready`.
pub struct NotReadyGenerator;

#[async_trait]
impl GenerativeModel for NotReadyGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: GenerationParams,
    ) -> Result<String, DentassistError> {
        Err(DentassistError::ModelNotReady(
            "generative model not configured".into(),
        ))
    }

    async fn stream(
        &self,
        _prompt: &str,
        _params: GenerationParams,
    ) -> Result<TokenStream, DentassistError> {
        Err(DentassistError::ModelNotReady(
            "generative model not configured".into(),
        ))
    }

    async fn ready(&self) -> bool {
        false
    }
}

/// Embedder stand-in; always `model/dependency_missing`.
///
/// Consultation saves still succeed (journal first); their index upserts
/// defer to the rebuild that runs once a real embedder is available.
pub struct NotReadyEmbedder;

#[async_trait]
impl TextEmbedder for NotReadyEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, DentassistError> {
        Err(DentassistError::ModelDependencyMissing(
            "embedding backend not compiled in (onnx feature)".into(),
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, DentassistError> {
        Err(DentassistError::ModelDependencyMissing(
            "embedding backend not compiled in (onnx feature)".into(),
        ))
    }

    fn dimensions(&self) -> usize {
        0
    }
}
