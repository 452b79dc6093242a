// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock embedder.
//!
//! Hashes lower-cased word tokens into a small fixed-dimension bag-of-words
//! vector and L2-normalises it. Texts sharing words embed close together,
//! which is enough signal for retrieval round-trip tests, and the output is
//! stable across runs (`DefaultHasher::new()` uses fixed keys).

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use dentassist_core::{DentassistError, TextEmbedder};

/// Embedding dimensionality of the mock.
pub const MOCK_DIM: usize = 32;

/// Deterministic bag-of-words embedder.
#[derive(Default)]
pub struct MockEmbedder {
    calls: AtomicU64,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed_batch` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; MOCK_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % MOCK_DIM as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DentassistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DentassistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        MOCK_DIM
    }

    fn parallel_safe(&self) -> bool {
        true
    }
}

/// An embedder that always fails. Exercises the index-deferral path.
pub struct FailingEmbedder;

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, DentassistError> {
        Err(DentassistError::ModelNotReady("mock embedder down".into()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, DentassistError> {
        Err(DentassistError::ModelNotReady("mock embedder down".into()))
    }

    fn dimensions(&self) -> usize {
        MOCK_DIM
    }
}
