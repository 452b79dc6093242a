// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process ONNX sentence embedder (all-MiniLM class).
//!
//! Runs the quantized model on CPU. The session is not thread-safe; it sits
//! behind a mutex and the backend reports `parallel_safe() == false`, so the
//! scheduler serialises access like the other model ports.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use dentassist_core::{DentassistError, TextEmbedder};

/// Embedding dimensions for the all-MiniLM family.
pub const EMBEDDING_DIM: usize = 384;

/// ONNX-backed embedder loading `model.onnx` + `tokenizer.json` from one
/// directory under `models/`.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl OnnxEmbedder {
    /// Loads the model and tokenizer from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, DentassistError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(DentassistError::ModelNotReady(format!(
                "embedding model files missing under {}",
                model_dir.display()
            )));
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            DentassistError::ModelNotReady(format!(
                "load tokenizer {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| DentassistError::SystemInternal(format!("onnx session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DentassistError::SystemInternal(format!("onnx optimization: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| DentassistError::SystemInternal(format!("onnx threads: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                DentassistError::ModelNotReady(format!(
                    "load onnx model {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, DentassistError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| DentassistError::InferenceRuntime(format!("tokenize: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> =
            encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();

        let shape_err =
            |e: ndarray::ShapeError| DentassistError::InferenceRuntime(format!("tensor shape: {e}"));
        let ids = Array2::from_shape_vec((1, seq_len), input_ids).map_err(shape_err)?;
        let mask =
            Array2::from_shape_vec((1, seq_len), attention_mask.clone()).map_err(shape_err)?;
        let types = Array2::from_shape_vec((1, seq_len), token_type_ids).map_err(shape_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DentassistError::SystemInternal(format!("onnx session lock: {e}")))?;

        let tensor_err =
            |e: ort::Error| DentassistError::InferenceRuntime(format!("tensor build: {e}"));
        let outputs = session
            .run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(&ids).map_err(tensor_err)?,
                "attention_mask" => TensorRef::from_array_view(&mask).map_err(tensor_err)?,
                "token_type_ids" => TensorRef::from_array_view(&types).map_err(tensor_err)?
            ])
            .map_err(|e| DentassistError::InferenceRuntime(format!("onnx inference: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DentassistError::InferenceRuntime(format!("extract tensor: {e}")))?;

        let hidden = shape[shape.len() - 1] as usize;
        Ok(l2_normalize(&mean_pool(data, &attention_mask, seq_len, hidden)))
    }
}

/// Attention-masked mean pooling over token embeddings.
fn mean_pool(embeddings: &[f32], attention_mask: &[i64], seq_len: usize, hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;
    for (i, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        if mask > 0 {
            for (j, v) in sum.iter_mut().enumerate() {
                *v += embeddings[i * hidden + j];
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for v in &mut sum {
            *v /= count;
        }
    }
    sum
}

fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[async_trait]
impl TextEmbedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DentassistError> {
        self.embed_one(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DentassistError> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Loading requires real model files; only the pooling math is unit
    // tested here.

    #[test]
    fn mean_pool_skips_padding() {
        let embeddings = [0.0, 0.0, 1.0, 3.0];
        let mask = [0i64, 1];
        assert_eq!(mean_pool(&embeddings, &mask, 2, 2), vec![1.0, 3.0]);
    }

    #[test]
    fn mean_pool_averages_real_tokens() {
        let embeddings = [1.0, 2.0, 3.0, 4.0];
        let mask = [1i64, 1];
        assert_eq!(mean_pool(&embeddings, &mask, 2, 2), vec![2.0, 3.0]);
    }

    #[test]
    fn l2_normalize_produces_unit_length() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
