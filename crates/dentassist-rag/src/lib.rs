// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consultation store and retrieval augmentation.
//!
//! Three layers: the append-only [`journal`] (authoritative), the dense
//! [`index`] (derived cache), and the [`coordinator`] that keeps the two
//! consistent and serves retrieval.

pub mod chunk;
pub mod coordinator;
pub mod index;
pub mod journal;
pub mod knowledge;

pub use coordinator::{RagCoordinator, RagStatus, SearchResult};
pub use index::{display_score, Hit, IndexedItem, ItemMeta, VectorIndex};
pub use journal::Journal;
pub use knowledge::seed_knowledge;
