// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RAG coordinator: journal + vector index, with rebuild-on-corruption.
//!
//! The journal is the authoritative source of truth; the index is a derived
//! cache. `save_consultation` writes the journal first -- that is the point
//! of no return -- then upserts the index. A failed upsert is retried once
//! and otherwise deferred to the next rebuild; the save itself still
//! succeeds.
//!
//! All embedding calls go through the scheduler's embed queue, so the
//! embedder backend is never touched concurrently unless it declared itself
//! parallel-safe.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dentassist_audit::AuditLog;
use dentassist_config::model::RagConfig;
use dentassist_core::{
    AuditAction, AuditOutcome, ConsultationRecord, DentassistError, IndexKind, KnowledgeDoc,
    TextEmbedder,
};
use dentassist_scheduler::{QueueKind, Scheduler};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::chunk::sentence_chunks;
use crate::index::{display_score, ItemMeta, VectorIndex};
use crate::journal::Journal;

/// O(1) status snapshot for diagnostics and UI gating.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RagStatus {
    pub consultations_count: usize,
    pub knowledge_count: usize,
    pub ready: bool,
}

/// One semantic search match over past consultations.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub smartnote: String,
    pub transcription: String,
    pub created_at: String,
    pub dentist_name: String,
    pub consultation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// UI-friendly score in [0, 1].
    pub score: f32,
}

/// Coordinates the journal, the vector index, and the embed queue.
pub struct RagCoordinator {
    journal: Journal,
    index: RwLock<VectorIndex>,
    index_path: PathBuf,
    embedder: Arc<dyn TextEmbedder>,
    scheduler: Arc<Scheduler>,
    audit: Arc<AuditLog>,
    config: RagConfig,
    /// Unique note digests seen in the journal; duplicates are tolerated on
    /// read and collapse here.
    digests: Mutex<HashSet<String>>,
    rebuilding: AtomicBool,
    deferred_upserts: AtomicU64,
}

impl RagCoordinator {
    /// Opens the journal and index. Never fails on a corrupt index -- that
    /// is what rebuilds are for -- only on an unopenable journal.
    pub fn open(
        journal_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        embedder: Arc<dyn TextEmbedder>,
        scheduler: Arc<Scheduler>,
        audit: Arc<AuditLog>,
        config: RagConfig,
    ) -> std::io::Result<Self> {
        let journal = Journal::open(journal_path)?;
        let index_path = index_path.into();

        let index = match VectorIndex::load(&index_path) {
            Ok(index) => index,
            Err(err) => {
                if index_path.exists() {
                    tracing::warn!(error = %err, "vector index failed validation, starting empty");
                } else {
                    tracing::info!("no vector index on disk, starting empty");
                }
                VectorIndex::new()
            }
        };

        let digests: HashSet<String> =
            journal.scan().into_iter().map(|r| r.digest).collect();

        tracing::info!(
            journal_records = digests.len(),
            indexed_consultations = index.count(IndexKind::Consultation),
            knowledge = index.count(IndexKind::Knowledge),
            "rag coordinator opened"
        );

        Ok(Self {
            journal,
            index: RwLock::new(index),
            index_path,
            embedder,
            scheduler,
            audit,
            config,
            digests: Mutex::new(digests),
            rebuilding: AtomicBool::new(false),
            deferred_upserts: AtomicU64::new(0),
        })
    }

    /// True when the index lags behind the journal and a rebuild is due.
    pub fn needs_rebuild(&self) -> bool {
        let indexed = self
            .index
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .count(IndexKind::Consultation);
        indexed < self.unique_journal_count()
    }

    /// Kicks off a background rebuild unless one is already running.
    pub fn spawn_rebuild(self: &Arc<Self>) {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!("starting background index rebuild from journal");
            if let Err(err) = this.rebuild_inner().await {
                tracing::error!(error = %err, "index rebuild failed");
            }
            this.rebuilding.store(false, Ordering::SeqCst);
        });
    }

    /// Runs a rebuild to completion. Used at startup recovery tests and by
    /// the background task.
    pub async fn rebuild_now(&self) -> Result<(), DentassistError> {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.rebuild_inner().await;
        self.rebuilding.store(false, Ordering::SeqCst);
        result
    }

    async fn rebuild_inner(&self) -> Result<(), DentassistError> {
        // Deduplicate by digest, newest record wins.
        let mut by_digest: HashMap<String, ConsultationRecord> = HashMap::new();
        for record in self.journal.scan() {
            by_digest.insert(record.digest.clone(), record);
        }
        let mut records: Vec<ConsultationRecord> = by_digest.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        // Knowledge is write-once and not derivable from the journal: carry
        // it over from the live index.
        let knowledge = self
            .index
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .items_of(IndexKind::Knowledge);

        let mut fresh = VectorIndex::new();
        for item in knowledge {
            fresh.upsert(item.id, item.kind, item.content, item.embedding, item.meta)?;
        }

        for batch in records.chunks(self.config.rebuild_batch.max(1)) {
            let texts: Vec<String> = batch.iter().map(|r| r.note.clone()).collect();
            let embeddings = self.embed_batch(texts).await?;
            for (record, embedding) in batch.iter().zip(embeddings) {
                fresh.upsert(
                    record.digest.clone(),
                    IndexKind::Consultation,
                    record.note.clone(),
                    embedding,
                    consultation_meta(record),
                )?;
            }
        }

        let rebuilt = fresh.count(IndexKind::Consultation);
        fresh.save(&self.index_path)?;
        {
            let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
            *index = fresh;
        }
        {
            let mut digests = self.digests.lock().unwrap_or_else(|p| p.into_inner());
            *digests = records.into_iter().map(|r| r.digest).collect();
        }
        tracing::info!(consultations = rebuilt, "index rebuild complete");
        Ok(())
    }

    /// One-time bulk indexing of the seed knowledge, chunked to sentence
    /// groups. Returns the number of chunks written.
    pub async fn ingest_knowledge(
        &self,
        docs: &[KnowledgeDoc],
    ) -> Result<usize, DentassistError> {
        let mut ids = Vec::new();
        let mut texts = Vec::new();
        let mut metas = Vec::new();
        for doc in docs {
            for (i, chunk) in sentence_chunks(&doc.body).into_iter().enumerate() {
                ids.push(format!("{}-c{:02}", doc.id, i + 1));
                texts.push(chunk);
                metas.push(ItemMeta {
                    source: doc.source.clone(),
                    section: doc.section.clone(),
                    ..ItemMeta::default()
                });
            }
        }
        if texts.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for start in (0..texts.len()).step_by(self.config.rebuild_batch.max(1)) {
            let end = (start + self.config.rebuild_batch.max(1)).min(texts.len());
            let embeddings = self.embed_batch(texts[start..end].to_vec()).await?;
            let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
            for (offset, embedding) in embeddings.into_iter().enumerate() {
                let i = start + offset;
                index.upsert(
                    ids[i].clone(),
                    IndexKind::Knowledge,
                    texts[i].clone(),
                    embedding,
                    metas[i].clone(),
                )?;
                written += 1;
            }
            index.save(&self.index_path)?;
        }
        tracing::info!(chunks = written, "knowledge base ingested");
        Ok(written)
    }

    /// Persists a consultation: journal first, then index.
    ///
    /// Journal success is the point of no return -- an index failure is
    /// retried once, then deferred to the next rebuild, audited as a
    /// separate failure, and the save still reports success.
    pub async fn save_consultation(
        &self,
        record: &ConsultationRecord,
    ) -> Result<(), DentassistError> {
        self.journal.append(record)?;
        self.digests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(record.digest.clone());

        let mut result = self.upsert_consultation(record).await;
        if result.is_err() {
            result = self.upsert_consultation(record).await;
        }
        if let Err(err) = result {
            self.deferred_upserts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                error = %err,
                digest = record.digest.as_str(),
                "index upsert deferred to next rebuild"
            );
            self.audit.record(
                AuditAction::ConsultationSave,
                &record.dentist_name,
                record.patient_id.as_deref().unwrap_or("consultation"),
                &record.correlation_id,
                AuditOutcome::Failure,
                &format!("index upsert deferred: {err}"),
            );
        }
        Ok(())
    }

    async fn upsert_consultation(
        &self,
        record: &ConsultationRecord,
    ) -> Result<(), DentassistError> {
        let embedding = self
            .embed_batch(vec![record.note.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DentassistError::SystemInternal("embedder returned no vector".into()))?;

        let mut index = self.index.write().unwrap_or_else(|p| p.into_inner());
        index.upsert(
            record.digest.clone(),
            IndexKind::Consultation,
            record.note.clone(),
            embedding,
            consultation_meta(record),
        )?;
        index.save(&self.index_path)
    }

    /// Semantic search over past consultations, newest-first among ties.
    pub async fn search_consultations(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, DentassistError> {
        let embedding = self
            .embed_batch(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DentassistError::SystemInternal("embedder returned no vector".into()))?;

        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        let hits = index.query(&embedding, k, Some(IndexKind::Consultation));
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                smartnote: hit.content,
                transcription: hit.meta.transcription,
                created_at: hit
                    .meta
                    .created_at
                    .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
                    .unwrap_or_default(),
                dentist_name: hit.meta.dentist_name,
                consultation_type: hit.meta.consultation_type,
                patient_id: hit.meta.patient_id,
                score: display_score(hit.score),
            })
            .collect())
    }

    /// Retrieves knowledge passages for prompt grounding. Empty when the
    /// knowledge base is empty; callers fall back to the plain prompt.
    pub async fn retrieve_context(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, DentassistError> {
        {
            let index = self.index.read().unwrap_or_else(|p| p.into_inner());
            if index.count(IndexKind::Knowledge) == 0 {
                return Ok(Vec::new());
            }
        }
        let embedding = self
            .embed_batch(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DentassistError::SystemInternal("embedder returned no vector".into()))?;

        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        let hits = index.query(&embedding, k, Some(IndexKind::Knowledge));
        Ok(hits
            .into_iter()
            .map(|hit| {
                let label = if hit.meta.section.is_empty() {
                    hit.meta.source
                } else {
                    format!("{} - {}", hit.meta.source, hit.meta.section)
                };
                format!("[{label}]\n{}", hit.content)
            })
            .collect())
    }

    /// O(1) status: counts plus the readiness flag.
    pub fn status(&self) -> RagStatus {
        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        let consultations_count = index.count(IndexKind::Consultation);
        let knowledge_count = index.count(IndexKind::Knowledge);
        let ready = !self.rebuilding.load(Ordering::SeqCst)
            && consultations_count >= self.unique_journal_count();
        RagStatus {
            consultations_count,
            knowledge_count,
            ready,
        }
    }

    /// Configured retrieval depth for prompt grounding.
    pub fn retrieval_k(&self) -> usize {
        self.config.retrieval_k
    }

    /// The underlying journal (export endpoint, metrics).
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Index upserts deferred to the next rebuild (metrics surface).
    pub fn deferred_upserts(&self) -> u64 {
        self.deferred_upserts.load(Ordering::Relaxed)
    }

    fn unique_journal_count(&self) -> usize {
        self.digests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, DentassistError> {
        let abort = CancellationToken::new();
        let embedder = Arc::clone(&self.embedder);
        self.scheduler
            .submit(QueueKind::Embed, &abort, None, move |_cancel| async move {
                embedder.embed_batch(&texts).await
            })
            .await
    }
}

fn consultation_meta(record: &ConsultationRecord) -> ItemMeta {
    ItemMeta {
        created_at: Some(record.created_at),
        dentist_name: record.dentist_name.clone(),
        consultation_type: record.consultation_type.clone(),
        patient_id: record.patient_id.clone(),
        transcription: record.transcription.clone(),
        ..ItemMeta::default()
    }
}
