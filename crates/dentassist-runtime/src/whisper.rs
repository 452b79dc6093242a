// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech backend speaking to a local whisper.cpp server.
//!
//! Audio is shipped as multipart form data to the server's `/inference`
//! endpoint; the server owns the Whisper weights and device selection.

use async_trait::async_trait;

use dentassist_core::{DentassistError, SpeechRecognizer};

use crate::types::InferenceResponse;

/// Client for a loopback whisper.cpp transcription server.
pub struct WhisperServerRecognizer {
    base_url: String,
    client: reqwest::Client,
    /// Language used when the caller supplies no hint.
    default_language: String,
}

impl WhisperServerRecognizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            default_language: "fr".to_string(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperServerRecognizer {
    async fn transcribe(
        &self,
        audio: &[u8],
        extension: &str,
        language_hint: Option<&str>,
    ) -> Result<String, DentassistError> {
        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{extension}"));
        let language = language_hint.unwrap_or(&self.default_language).to_string();
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("language", language)
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/inference", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    DentassistError::ModelNotReady(format!(
                        "whisper server unreachable at {}: {err}",
                        self.base_url
                    ))
                } else {
                    DentassistError::InferenceRuntime(format!("whisper server request: {err}"))
                }
            })?;

        match response.status().as_u16() {
            200 => {
                let inference: InferenceResponse = response.json().await.map_err(|err| {
                    DentassistError::InferenceRuntime(format!("decode transcription: {err}"))
                })?;
                Ok(inference.text.trim().to_string())
            }
            503 => Err(DentassistError::ModelNotReady(
                "whisper server is still loading the model".into(),
            )),
            status => Err(DentassistError::InferenceRuntime(format!(
                "whisper server returned HTTP {status}"
            ))),
        }
    }

    async fn ready(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn transcribe_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": " Douleur molaire trente-six. "
            })))
            .mount(&server)
            .await;

        let recognizer = WhisperServerRecognizer::new(server.uri());
        let text = recognizer
            .transcribe(b"RIFF fake", "wav", Some("fr"))
            .await
            .unwrap();
        assert_eq!(text, "Douleur molaire trente-six.");
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_not_ready() {
        let recognizer = WhisperServerRecognizer::new("http://127.0.0.1:9");
        let result = recognizer.transcribe(b"RIFF", "wav", None).await;
        assert!(matches!(result, Err(DentassistError::ModelNotReady(_))));
    }
}
