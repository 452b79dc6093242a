// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sentence embedding port.

use async_trait::async_trait;

use crate::error::DentassistError;

/// Produces fixed-dimension, L2-normalised sentence embeddings.
///
/// Normalisation is part of the contract: the vector index scores with a
/// plain dot product and relies on unit-length vectors for cosine semantics.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DentassistError>;

    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DentassistError>;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// True when the backend tolerates concurrent calls. When false the
    /// scheduler serialises access exactly like the other model ports.
    fn parallel_safe(&self) -> bool {
        false
    }
}
