// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generative model with pre-configured completions.
//!
//! Completions pop from a FIFO queue; an empty queue yields a default note.
//! The streaming path emits one word per chunk and honours the abort token,
//! so cancellation tests observe token production actually stopping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use dentassist_core::{
    DentassistError, GenerationParams, GenerativeModel, TokenChunk, TokenStream,
};

const DEFAULT_NOTE: &str = "SmartNote simulée: motif, examen, diagnostic, traitement.";

/// A mock generator returning pre-configured completions.
pub struct MockGenerator {
    responses: Arc<Mutex<VecDeque<String>>>,
    chunk_delay: Duration,
    calls: AtomicU64,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    /// Pre-load completions, first in first out.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            chunk_delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// Delay between streamed chunks, and the duration of unary calls.
    /// Lets tests hold a generate worker busy for a controlled window.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Number of generation calls (unary + streaming) so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> String {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| DEFAULT_NOTE.to_string())
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeModel for MockGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        params: GenerationParams,
    ) -> Result<String, DentassistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.chunk_delay.is_zero() {
            // A unary backend may ignore aborts entirely; emulate the
            // cooperative kind that returns early when asked.
            tokio::select! {
                _ = tokio::time::sleep(self.chunk_delay) => {}
                _ = params.abort.cancelled() => {
                    return Err(DentassistError::InferenceCancelled);
                }
            }
        }
        Ok(self.next_response())
    }

    async fn stream(
        &self,
        _prompt: &str,
        params: GenerationParams,
    ) -> Result<TokenStream, DentassistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        let words: Vec<String> = response
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();
        let delay = self.chunk_delay;
        let abort = params.abort;

        let stream = stream::unfold(
            (words.into_iter(), abort, false),
            move |(mut words, abort, done)| async move {
                if done {
                    return None;
                }
                if abort.is_cancelled() {
                    // Halt token production without a terminal sentinel; the
                    // consumer sees the stream end early.
                    return None;
                }
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = abort.cancelled() => return None,
                    }
                }
                match words.next() {
                    Some(word) => Some((Ok(TokenChunk::Delta(word)), (words, abort, false))),
                    None => Some((Ok(TokenChunk::Done), (words, abort, true))),
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn ready(&self) -> bool {
        true
    }
}
