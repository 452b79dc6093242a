// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the local model runtime servers.

use serde::{Deserialize, Serialize};

/// Request body for the llama.cpp server `/completion` endpoint.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub n_predict: u32,
    pub temperature: f32,
    pub stream: bool,
    /// Reuse the prompt KV cache between calls with a shared prefix.
    pub cache_prompt: bool,
}

/// Unary response from `/completion`.
#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

/// One SSE chunk from a streaming `/completion`.
#[derive(Debug, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub content: String,
    /// True on the terminal chunk.
    #[serde(default)]
    pub stop: bool,
}

/// Response from the whisper.cpp server `/inference` endpoint.
#[derive(Debug, Deserialize)]
pub struct InferenceResponse {
    pub text: String,
}
