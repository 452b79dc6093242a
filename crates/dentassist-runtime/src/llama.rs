// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generative backend speaking to a local llama.cpp `llama-server`.
//!
//! The server owns the GGUF weights and the GPU; this client owns nothing
//! but an HTTP connection to loopback. Streaming responses are SSE frames
//! parsed with `eventsource-stream`; dropping the stream closes the
//! connection, which is how the server learns to stop decoding.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;

use dentassist_core::{
    DentassistError, GenerationParams, GenerativeModel, TokenChunk, TokenStream,
};

use crate::types::{CompletionChunk, CompletionRequest, CompletionResponse};

/// Client for a loopback llama.cpp completion server.
pub struct LlamaServerModel {
    base_url: String,
    client: reqwest::Client,
}

impl LlamaServerModel {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn completion_url(&self) -> String {
        format!("{}/completion", self.base_url)
    }

    async fn post_completion(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, DentassistError> {
        let body = CompletionRequest {
            prompt,
            n_predict: params.max_tokens,
            temperature: params.temperature,
            stream,
            cache_prompt: true,
        };
        let response = self
            .client
            .post(self.completion_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    DentassistError::ModelNotReady(format!(
                        "llama server unreachable at {}: {err}",
                        self.base_url
                    ))
                } else {
                    DentassistError::InferenceRuntime(format!("llama server request: {err}"))
                }
            })?;

        match response.status().as_u16() {
            200 => Ok(response),
            503 => Err(DentassistError::ModelNotReady(
                "llama server is still loading the model".into(),
            )),
            status => Err(DentassistError::InferenceRuntime(format!(
                "llama server returned HTTP {status}"
            ))),
        }
    }
}

#[async_trait]
impl GenerativeModel for LlamaServerModel {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, DentassistError> {
        let response = self.post_completion(prompt, &params, false).await?;
        let completion: CompletionResponse = response.json().await.map_err(|err| {
            DentassistError::InferenceRuntime(format!("decode completion: {err}"))
        })?;
        Ok(completion.content.trim().to_string())
    }

    async fn stream(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<TokenStream, DentassistError> {
        let abort = params.abort.clone();
        let response = self.post_completion(prompt, &params, true).await?;

        let events = response
            .bytes_stream()
            .eventsource()
            // Halting on abort drops the SSE connection, which stops the
            // server-side decode loop.
            .take_until(abort.cancelled_owned())
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        match serde_json::from_str::<CompletionChunk>(&event.data) {
                            Ok(chunk) if chunk.stop => Some(Ok(TokenChunk::Done)),
                            Ok(chunk) if chunk.content.is_empty() => None,
                            Ok(chunk) => Some(Ok(TokenChunk::Delta(chunk.content))),
                            Err(err) => Some(Err(DentassistError::InferenceStream(format!(
                                "decode stream chunk: {err}"
                            )))),
                        }
                    }
                    Err(err) => Some(Err(DentassistError::InferenceStream(format!(
                        "completion stream: {err}"
                    )))),
                }
            });

        Ok(Box::pin(events))
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
    async fn generate_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "  MOTIF: douleur 36.\n",
                "stop": true,
            })))
            .mount(&server)
            .await;

        let model = LlamaServerModel::new(server.uri());
        let note = model
            .generate("prompt", GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(note, "MOTIF: douleur 36.");
    }

    #[tokio::test]
    async fn stream_parses_chunks_until_stop() {
        let server = MockServer::start().await;
        let sse = "data: {\"content\":\"MOTIF\",\"stop\":false}\n\n\
                   data: {\"content\":\": douleur\",\"stop\":false}\n\n\
                   data: {\"content\":\"\",\"stop\":true}\n\n";
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let model = LlamaServerModel::new(server.uri());
        let mut stream = model
            .stream("prompt", GenerationParams::default())
            .await
            .unwrap();

        let mut text = String::new();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            match chunk.unwrap() {
                TokenChunk::Delta(t) => text.push_str(&t),
                TokenChunk::Done => saw_done = true,
            }
        }
        assert_eq!(text, "MOTIF: douleur");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn loading_server_maps_to_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let model = LlamaServerModel::new(server.uri());
        let result = model.generate("prompt", GenerationParams::default()).await;
        assert!(matches!(result, Err(DentassistError::ModelNotReady(_))));
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_not_ready() {
        // Nothing listens on this port.
        let model = LlamaServerModel::new("http://127.0.0.1:9");
        let result = model.generate("prompt", GenerationParams::default()).await;
        assert!(matches!(result, Err(DentassistError::ModelNotReady(_))));
        assert!(!model.ready().await);
    }
}
