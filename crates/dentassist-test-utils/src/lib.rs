// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for dentassist integration tests.
//!
//! Mock implementations of the three model capability ports, for fast,
//! deterministic, CI-runnable tests without model weights or local runtime
//! servers.
//!
//! # Components
//!
//! - [`MockEmbedder`] - deterministic bag-of-words embeddings
//! - [`MockGenerator`] - pre-configured completions, unary and streaming
//! - [`MockSpeech`] - canned transcriptions with a call counter

pub mod mock_embedder;
pub mod mock_generator;
pub mod mock_speech;

pub use mock_embedder::{FailingEmbedder, MockEmbedder};
pub use mock_generator::MockGenerator;
pub use mock_speech::MockSpeech;
