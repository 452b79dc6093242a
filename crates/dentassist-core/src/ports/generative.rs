// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generative model port.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::DentassistError;

/// Sampling and bounding parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Hard cap on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Best-effort abort signal. Streaming backends stop producing tokens
    /// when this fires; unary backends may run to completion, in which case
    /// the scheduler discards the result.
    pub abort: CancellationToken,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.3,
            abort: CancellationToken::new(),
        }
    }
}

/// One element of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenChunk {
    /// A token-sized piece of generated text.
    Delta(String),
    /// Terminal sentinel: generation finished normally.
    Done,
}

/// Boxed stream of token chunks, ending with [`TokenChunk::Done`].
pub type TokenStream = BoxStream<'static, Result<TokenChunk, DentassistError>>;

/// Synthesises SmartNote text from a composed prompt.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generate the full completion in one call.
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, DentassistError>;

    /// Generate a stream of token chunks terminated by [`TokenChunk::Done`].
    async fn stream(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<TokenStream, DentassistError>;

    /// Whether the generator can serve requests right now.
    async fn ready(&self) -> bool;
}
