// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete model backends behind the capability ports.
//!
//! Generation and speech recognition speak to loopback llama.cpp /
//! whisper.cpp servers; embedding runs in-process via ONNX when the `onnx`
//! feature is enabled. When a backend cannot be constructed (weights or
//! feature absent), the [`stub`] backends stand in and answer
//! `model/not_ready`, so the rest of the service keeps working -- the
//! original deployment degrades the same way.

pub mod download;
pub mod llama;
pub mod stub;
pub mod types;
pub mod whisper;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use download::{
    embedding_specs, generative_spec, DownloadProgress, ModelDownloadManager, ModelSpec,
};
pub use llama::LlamaServerModel;
pub use stub::{NotReadyEmbedder, NotReadyGenerator, NotReadyRecognizer};
pub use whisper::WhisperServerRecognizer;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbedder, EMBEDDING_DIM};
