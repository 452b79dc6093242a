// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process dense vector index over notes and knowledge passages.
//!
//! Cosine similarity via plain dot product -- the embedder contract
//! guarantees L2-normalised vectors. The index is a derived cache of the
//! journal: it persists to `rag_data/index.json` through a temp-file +
//! atomic-rename, and the coordinator rebuilds it from scratch whenever a
//! load fails structural validation or the counts contradict the journal.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use dentassist_core::{DentassistError, IndexKind};
use serde::{Deserialize, Serialize};

const INDEX_FILE_VERSION: u32 = 1;

/// Metadata carried alongside an indexed item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Creation instant; present for consultations, used for tie-breaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dentist_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consultation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transcription: String,
    /// Knowledge provenance.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
}

/// One stored item (either kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedItem {
    pub id: String,
    pub kind: IndexKind,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub meta: ItemMeta,
}

/// One query match.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub kind: IndexKind,
    /// Raw cosine similarity in [-1, 1].
    pub score: f32,
    pub content: String,
    pub meta: ItemMeta,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dim: Option<usize>,
    items: Vec<IndexedItem>,
}

/// Dense nearest-neighbour index. Deletion is deliberately unsupported:
/// consultations are never edited, and knowledge is write-once.
#[derive(Default)]
pub struct VectorIndex {
    dim: Option<usize>,
    items: HashMap<String, IndexedItem>,
}

impl VectorIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and structurally validates a persisted index.
    pub fn load(path: &Path) -> Result<Self, DentassistError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DentassistError::StoragePersist(format!("read index: {e}")))?;
        let file: IndexFile = serde_json::from_str(&content)
            .map_err(|e| DentassistError::StoragePersist(format!("decode index: {e}")))?;

        if file.version != INDEX_FILE_VERSION {
            return Err(DentassistError::StoragePersist(format!(
                "unsupported index version {}",
                file.version
            )));
        }
        let mut items = HashMap::with_capacity(file.items.len());
        for item in file.items {
            if item.id.is_empty() {
                return Err(DentassistError::StoragePersist("item with empty id".into()));
            }
            if let Some(dim) = file.dim {
                if item.embedding.len() != dim {
                    return Err(DentassistError::StoragePersist(format!(
                        "embedding dimension mismatch for {}: {} != {dim}",
                        item.id,
                        item.embedding.len()
                    )));
                }
            }
            items.insert(item.id.clone(), item);
        }
        Ok(Self {
            dim: file.dim,
            items,
        })
    }

    /// Persists via a scratch file and atomic rename, so concurrent readers
    /// of the file never observe a half-written state.
    pub fn save(&self, path: &Path) -> Result<(), DentassistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DentassistError::StoragePersist(format!("create index dir: {e}")))?;
        }
        let mut items: Vec<&IndexedItem> = self.items.values().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let file = IndexFile {
            version: INDEX_FILE_VERSION,
            dim: self.dim,
            items: items.into_iter().cloned().collect(),
        };
        let encoded = serde_json::to_vec(&file)
            .map_err(|e| DentassistError::StoragePersist(format!("encode index: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &encoded)
            .map_err(|e| DentassistError::StoragePersist(format!("write index scratch: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| DentassistError::StoragePersist(format!("swap index: {e}")))
    }

    /// Inserts or replaces one item. The first upsert fixes the index
    /// dimensionality; later mismatches are rejected.
    pub fn upsert(
        &mut self,
        id: impl Into<String>,
        kind: IndexKind,
        content: impl Into<String>,
        embedding: Vec<f32>,
        meta: ItemMeta,
    ) -> Result<(), DentassistError> {
        let id = id.into();
        if embedding.is_empty() {
            return Err(DentassistError::StoragePersist(format!(
                "empty embedding for {id}"
            )));
        }
        match self.dim {
            None => self.dim = Some(embedding.len()),
            Some(dim) if dim != embedding.len() => {
                return Err(DentassistError::StoragePersist(format!(
                    "embedding dimension mismatch for {id}: {} != {dim}",
                    embedding.len()
                )));
            }
            Some(_) => {}
        }
        self.items.insert(
            id.clone(),
            IndexedItem {
                id,
                kind,
                content: content.into(),
                embedding,
                meta,
            },
        );
        Ok(())
    }

    /// Nearest neighbours by cosine similarity.
    ///
    /// Equal scores break ties by newer `created_at` first, then by
    /// lexicographic id, so results are deterministic.
    pub fn query(&self, embedding: &[f32], k: usize, kind_filter: Option<IndexKind>) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .items
            .values()
            .filter(|item| kind_filter.is_none_or(|kind| item.kind == kind))
            .filter(|item| item.embedding.len() == embedding.len())
            .map(|item| Hit {
                id: item.id.clone(),
                kind: item.kind,
                score: dot(&item.embedding, embedding),
                content: item.content.clone(),
                meta: item.meta.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.meta.created_at.cmp(&a.meta.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    /// Number of items of one kind.
    pub fn count(&self, kind: IndexKind) -> usize {
        self.items.values().filter(|item| item.kind == kind).count()
    }

    /// Whether an id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Items of one kind, cloned. Used to carry knowledge across rebuilds.
    pub fn items_of(&self, kind: IndexKind) -> Vec<IndexedItem> {
        self.items
            .values()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.items.clear();
        self.dim = None;
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Maps a raw cosine score to a UI-friendly [0, 1]: clip, then rescale.
pub fn display_score(score: f32) -> f32 {
    (score.clamp(-1.0, 1.0) + 1.0) / 2.0
}
