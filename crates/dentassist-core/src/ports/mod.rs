// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model capability ports.
//!
//! Three narrow interfaces the core consumes; concrete backends are selected
//! once at process start. All three are assumed thread-hostile -- the
//! scheduler guarantees at most one active call per recogniser and per
//! generator, and treats the embedder the same unless it declares itself
//! parallel-safe.

pub mod embedding;
pub mod generative;
pub mod speech;

pub use embedding::TextEmbedder;
pub use generative::{GenerationParams, GenerativeModel, TokenChunk, TokenStream};
pub use speech::SpeechRecognizer;
