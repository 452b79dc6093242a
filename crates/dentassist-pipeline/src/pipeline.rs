// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The SmartNote pipeline: transcription, retrieval-augmented generation,
//! and post-success persistence.
//!
//! The pipeline owns no parallelism of its own -- every model call goes
//! through the scheduler. Streaming responses are pumped through an mpsc
//! channel: the HTTP layer consumes the receiver, and a dropped receiver
//! (client disconnect) cancels the underlying generation. A note that was
//! never fully delivered is never persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dentassist_audit::AuditLog;
use dentassist_core::{
    AuditAction, AuditOutcome, ConsultationRecord, DentassistError, GenerationParams,
    GenerativeModel, SpeechRecognizer, TokenChunk, TokenStream,
};
use dentassist_rag::RagCoordinator;
use dentassist_scheduler::{QueueKind, Scheduler, Slot};
use futures::StreamExt;
use ring::digest::{digest, SHA256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::prompt::{rag_smartnote_prompt, smartnote_prompt};
use crate::sanitize::sanitize_input;
use crate::singleflight::SingleFlight;

/// Pipeline tuning, derived from the application config by the binary.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_text_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub generation_deadline: Duration,
    pub transcribe_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 50_000,
            max_tokens: 800,
            temperature: 0.3,
            generation_deadline: Duration::from_secs(120),
            transcribe_deadline: Duration::from_secs(180),
        }
    }
}

/// Per-request context threaded from the HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, also the `X-Request-ID` response header.
    pub correlation_id: String,
    /// Actor for audit entries; "local-user" when the request names nobody.
    pub actor: String,
    /// Fires on client disconnect, explicit timeout, or shutdown.
    pub abort: CancellationToken,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            actor: "local-user".to_string(),
            abort: CancellationToken::new(),
        }
    }
}

/// Result of a unary summarisation.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub note: String,
    pub rag_enhanced: bool,
    pub sources_used: usize,
}

/// One event of a streaming summarisation, framed as SSE by the gateway.
#[derive(Debug)]
pub enum NoteEvent {
    /// A token-sized piece of note text.
    Chunk(String),
    /// Terminal error; no further events follow.
    Error(DentassistError),
    /// Terminal sentinel; generation finished and the note was persisted.
    Done,
}

/// A streaming summarisation in flight.
#[derive(Debug)]
pub struct NoteStream {
    /// Whether retrieved passages ground this generation.
    pub rag_enhanced: bool,
    /// Event channel; dropping it cancels the generation.
    pub events: mpsc::Receiver<NoteEvent>,
}

/// Orchestrates transcription, retrieval, generation, and persistence.
pub struct SmartNotePipeline {
    scheduler: Arc<Scheduler>,
    rag: Arc<RagCoordinator>,
    speech: Arc<dyn SpeechRecognizer>,
    generator: Arc<dyn GenerativeModel>,
    audit: Arc<AuditLog>,
    config: PipelineConfig,
    transcribe_flight: SingleFlight,
    save_failures: Arc<AtomicU64>,
}

impl SmartNotePipeline {
    pub fn new(
        scheduler: Arc<Scheduler>,
        rag: Arc<RagCoordinator>,
        speech: Arc<dyn SpeechRecognizer>,
        generator: Arc<dyn GenerativeModel>,
        audit: Arc<AuditLog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            scheduler,
            rag,
            speech,
            generator,
            audit,
            config,
            transcribe_flight: SingleFlight::new(),
            save_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Audio to text through the speech queue.
    ///
    /// Single-flighted over `(digest(audio), language_hint)`: a client
    /// retrying an upload while the first is still running shares the same
    /// backend call instead of re-running the recogniser.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        extension: &str,
        language_hint: Option<String>,
        ctx: &RequestContext,
    ) -> Result<String, DentassistError> {
        let key = format!(
            "{}:{}",
            hex::encode(digest(&SHA256, &audio)),
            language_hint.as_deref().unwrap_or("")
        );

        let scheduler = Arc::clone(&self.scheduler);
        let speech = Arc::clone(&self.speech);
        let abort = ctx.abort.clone();
        let deadline = self.config.transcribe_deadline;
        let extension = extension.to_string();

        let (result, leader) = self
            .transcribe_flight
            .run(key, move || async move {
                scheduler
                    .submit(QueueKind::Speech, &abort, Some(deadline), move |_cancel| {
                        async move {
                            speech
                                .transcribe(&audio, &extension, language_hint.as_deref())
                                .await
                        }
                    })
                    .await
            })
            .await;

        if !leader {
            tracing::debug!(
                correlation_id = ctx.correlation_id.as_str(),
                "transcription shared with an identical in-flight upload"
            );
        }
        result
    }

    /// Text to note, unary. `use_rag` asks for knowledge grounding; the
    /// pipeline silently falls back to the plain path when retrieval fails
    /// or yields nothing.
    pub async fn summarize(
        &self,
        text: &str,
        use_rag: bool,
        ctx: &RequestContext,
    ) -> Result<SummaryOutcome, DentassistError> {
        let sanitized = sanitize_input(text, self.config.max_text_chars);
        if sanitized.is_empty() {
            return Err(DentassistError::InputEmpty);
        }

        let passages = self.retrieval(&sanitized, use_rag).await;
        let rag_enhanced = !passages.is_empty();
        let prompt = if rag_enhanced {
            rag_smartnote_prompt(&sanitized, &passages)
        } else {
            smartnote_prompt(&sanitized)
        };

        let generator = Arc::clone(&self.generator);
        let max_tokens = self.config.max_tokens;
        let temperature = self.config.temperature;
        let note = self
            .scheduler
            .submit(
                QueueKind::Generate,
                &ctx.abort,
                Some(self.config.generation_deadline),
                move |cancel| async move {
                    generator
                        .generate(
                            &prompt,
                            GenerationParams {
                                max_tokens,
                                temperature,
                                abort: cancel,
                            },
                        )
                        .await
                },
            )
            .await?;

        self.persist(&sanitized, &note, ctx).await;

        Ok(SummaryOutcome {
            note,
            rag_enhanced,
            sources_used: passages.len(),
        })
    }

    /// Text to note, streaming. The worker slot stays claimed until the
    /// pump task finishes; dropping the returned receiver cancels the
    /// generation and nothing is persisted.
    pub async fn summarize_stream(
        &self,
        text: &str,
        use_rag: bool,
        ctx: &RequestContext,
    ) -> Result<NoteStream, DentassistError> {
        let sanitized = sanitize_input(text, self.config.max_text_chars);
        if sanitized.is_empty() {
            return Err(DentassistError::InputEmpty);
        }

        let passages = self.retrieval(&sanitized, use_rag).await;
        let rag_enhanced = !passages.is_empty();
        let prompt = if rag_enhanced {
            rag_smartnote_prompt(&sanitized, &passages)
        } else {
            smartnote_prompt(&sanitized)
        };

        let slot = self.scheduler.admit(QueueKind::Generate, &ctx.abort).await?;
        let cancel = slot.cancellation();

        let stream = match self
            .generator
            .stream(
                &prompt,
                GenerationParams {
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                    abort: cancel.clone(),
                },
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                cancel.cancel();
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel(32);
        let action = if use_rag {
            AuditAction::SummarizeStreamRag
        } else {
            AuditAction::SummarizeStream
        };
        tokio::spawn(pump_stream(PumpContext {
            slot,
            stream,
            tx,
            cancel,
            rag: Arc::clone(&self.rag),
            audit: Arc::clone(&self.audit),
            save_failures: Arc::clone(&self.save_failures),
            transcription: sanitized,
            correlation_id: ctx.correlation_id.clone(),
            actor: ctx.actor.clone(),
            action,
            deadline: self.config.generation_deadline,
        }));

        Ok(NoteStream {
            rag_enhanced,
            events: rx,
        })
    }

    /// Consultation saves that failed after generation (metrics surface).
    pub fn save_failures(&self) -> u64 {
        self.save_failures.load(Ordering::Relaxed)
    }

    async fn retrieval(&self, text: &str, use_rag: bool) -> Vec<String> {
        if !use_rag {
            return Vec::new();
        }
        let status = self.rag.status();
        if !status.ready || status.knowledge_count == 0 {
            return Vec::new();
        }
        match self.rag.retrieve_context(text, self.rag.retrieval_k()).await {
            Ok(passages) => passages,
            Err(err) => {
                tracing::warn!(error = %err, "knowledge retrieval failed, using plain prompt");
                Vec::new()
            }
        }
    }

    async fn persist(&self, transcription: &str, note: &str, ctx: &RequestContext) {
        let mut record = ConsultationRecord::new(ctx.correlation_id.as_str(), note);
        record.transcription = transcription.to_string();

        if let Err(err) = self.rag.save_consultation(&record).await {
            self.save_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                error = %err,
                correlation_id = ctx.correlation_id.as_str(),
                "failed to persist generated note"
            );
            self.audit.record(
                AuditAction::ConsultationSave,
                &ctx.actor,
                "consultation",
                &ctx.correlation_id,
                AuditOutcome::Failure,
                &err.to_string(),
            );
        }
    }
}

struct PumpContext {
    slot: Slot,
    stream: TokenStream,
    tx: mpsc::Sender<NoteEvent>,
    cancel: CancellationToken,
    rag: Arc<RagCoordinator>,
    audit: Arc<AuditLog>,
    save_failures: Arc<AtomicU64>,
    transcription: String,
    correlation_id: String,
    actor: String,
    action: AuditAction,
    deadline: Duration,
}

/// Drives one token stream to the HTTP layer.
///
/// The slot is owned here, so the generate worker stays claimed for the
/// stream's whole lifetime. Exactly one audit entry is written when the
/// stream ends, reflecting the actual outcome -- the response status was
/// already sent long before.
async fn pump_stream(ctx: PumpContext) {
    let PumpContext {
        slot,
        mut stream,
        tx,
        cancel,
        rag,
        audit,
        save_failures,
        transcription,
        correlation_id,
        actor,
        action,
        deadline,
    } = ctx;

    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    let mut note = String::new();
    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(TokenChunk::Delta(chunk))) => {
                    note.push_str(&chunk);
                    if tx.send(NoteEvent::Chunk(chunk)).await.is_err() {
                        // Receiver gone: the client disconnected. Halt the
                        // backend and do not persist an undelivered note.
                        cancel.cancel();
                        audit.record(
                            action, &actor, "smartnote", &correlation_id,
                            AuditOutcome::Failure, "cancelled",
                        );
                        break;
                    }
                }
                Some(Ok(TokenChunk::Done)) => {
                    let mut record =
                        ConsultationRecord::new(correlation_id.as_str(), note.as_str());
                    record.transcription = transcription.clone();
                    if let Err(err) = rag.save_consultation(&record).await {
                        save_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %err, "failed to persist streamed note");
                        audit.record(
                            AuditAction::ConsultationSave, &actor, "consultation",
                            &correlation_id, AuditOutcome::Failure, &err.to_string(),
                        );
                    }
                    audit.record(
                        action, &actor, "smartnote", &correlation_id,
                        AuditOutcome::Success, "",
                    );
                    let _ = tx.send(NoteEvent::Done).await;
                    break;
                }
                Some(Err(err)) => {
                    audit.record(
                        action, &actor, "smartnote", &correlation_id,
                        AuditOutcome::Failure, err.kind(),
                    );
                    let _ = tx.send(NoteEvent::Error(err)).await;
                    break;
                }
                None => {
                    // Stream ended without the sentinel: the backend halted
                    // after an abort. Nothing is persisted.
                    audit.record(
                        action, &actor, "smartnote", &correlation_id,
                        AuditOutcome::Failure, "cancelled",
                    );
                    break;
                }
            },
            _ = tx.closed() => {
                cancel.cancel();
                audit.record(
                    action, &actor, "smartnote", &correlation_id,
                    AuditOutcome::Failure, "cancelled",
                );
                break;
            }
            _ = &mut timer => {
                cancel.cancel();
                audit.record(
                    action, &actor, "smartnote", &correlation_id,
                    AuditOutcome::Failure, "cancelled",
                );
                let _ = tx.send(NoteEvent::Error(DentassistError::InferenceCancelled)).await;
                break;
            }
        }
    }

    // Reap the slot's cancellation watcher and release the worker.
    cancel.cancel();
    drop(slot);
}
