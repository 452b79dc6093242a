// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Every audited endpoint writes exactly one completed audit entry at exit
//! with the final outcome. Streaming endpoints delegate that write to the
//! pipeline's pump task, which knows how the stream actually ended.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Multipart, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{SecondsFormat, Utc};
use dentassist_core::{
    note_digest, AuditAction, AuditOutcome, ConsultationRecord, DentassistError,
};
use dentassist_pipeline::{sanitize_input, NoteEvent, NoteStream, RequestContext};
use dentassist_scheduler::QueueKind;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::GatewayState;
use crate::trace::RequestId;

/// Accepted audio containers for transcription.
const ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "ogg", "webm", "mp4"];

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct RagSummaryResponse {
    pub summary: String,
    pub rag_enhanced: bool,
    pub sources_used: usize,
}

#[derive(Debug, Deserialize)]
pub struct SaveConsultationRequest {
    pub smartnote: String,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub dentist_name: String,
    #[serde(default)]
    pub consultation_type: String,
    #[serde(default)]
    pub patient_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub n: Option<usize>,
}

fn request_context(state: &GatewayState, request_id: &str) -> RequestContext {
    RequestContext {
        correlation_id: request_id.to_string(),
        actor: "local-user".to_string(),
        abort: state.shutdown.child_token(),
    }
}

/// GET /health -- liveness probe used by the desktop shell boot sequence.
pub async fn get_health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let (models_ready, whisper_ready) =
        tokio::join!(state.generator.ready(), state.speech.ready());
    Json(serde_json::json!({
        "status": "ok",
        "models_ready": models_ready,
        "whisper_ready": whisper_ready,
    }))
}

/// GET /llm/status -- generate-queue snapshot.
pub async fn get_llm_status(State(state): State<GatewayState>) -> Response {
    Json(state.scheduler.status().generate).into_response()
}

/// GET /workers/status -- per-queue `{running, waiting, capacity}`.
pub async fn get_workers_status(State(state): State<GatewayState>) -> Response {
    Json(state.scheduler.status()).into_response()
}

/// GET /metrics -- counters, percentiles, recent errors.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    let mut counters: HashMap<&'static str, u64> = HashMap::new();
    counters.insert("audit_write_failures", state.audit.write_failures());
    counters.insert("journal_skipped_lines", state.rag.journal().skipped_lines());
    counters.insert("deferred_index_upserts", state.rag.deferred_upserts());
    counters.insert("consultation_save_failures", state.pipeline.save_failures());
    Json(state.metrics.snapshot(counters)).into_response()
}

/// GET /audit/recent?n= -- newest audit entries.
pub async fn get_audit_recent(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Query(query): Query<AuditQuery>,
) -> Response {
    let n = query.n.unwrap_or(100).clamp(1, 1000);
    let entries = state.audit.recent(n);
    state.audit.record(
        AuditAction::AuditRead,
        "",
        "all",
        &request_id,
        AuditOutcome::Success,
        "",
    );
    Json(serde_json::json!({ "count": entries.len(), "entries": entries })).into_response()
}

/// POST /transcribe -- audio to text.
pub async fn post_transcribe(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    multipart: Multipart,
) -> Response {
    let audit_exit = |resource: &str, outcome: AuditOutcome, detail: &str| {
        state.audit.record(
            AuditAction::Transcribe,
            "",
            resource,
            &request_id,
            outcome,
            detail,
        );
    };

    if state.scheduler.is_overloaded(QueueKind::Speech) {
        let err = DentassistError::InferenceBusy {
            retry_after_secs: 5,
        };
        audit_exit("upload", AuditOutcome::Failure, err.kind());
        return ApiError::new(err, request_id.clone()).into_response();
    }

    let upload = match read_audio_upload(multipart, state.limits.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(err) => {
            audit_exit("upload", AuditOutcome::Failure, err.kind());
            return ApiError::new(err, request_id.clone()).into_response();
        }
    };

    let ctx = request_context(&state, &request_id);
    match state
        .pipeline
        .transcribe(upload.audio, &upload.extension, upload.language, &ctx)
        .await
    {
        Ok(text) => {
            audit_exit(&upload.filename, AuditOutcome::Success, "");
            Json(serde_json::json!({ "text": text, "request_id": &request_id }))
                .into_response()
        }
        Err(err) => {
            audit_exit(&upload.filename, AuditOutcome::Failure, err.kind());
            ApiError::new(err, request_id.clone()).into_response()
        }
    }
}

struct AudioUpload {
    filename: String,
    extension: String,
    audio: Vec<u8>,
    language: Option<String>,
}

/// Streams the multipart body, enforcing the upload cap while reading --
/// the `Content-Length` middleware cannot be trusted for chunked bodies.
async fn read_audio_upload(
    mut multipart: Multipart,
    max_bytes: u64,
) -> Result<AudioUpload, DentassistError> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;
    let mut language: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| DentassistError::InputHeader(format!("multipart: {e}")))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .ok_or(DentassistError::InputFilenameMissing)?
                    .to_string();
                let extension = filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
                    return Err(DentassistError::InputExtension(format!(
                        ".{extension} (allowed: {})",
                        ALLOWED_EXTENSIONS.join(", ")
                    )));
                }

                let mut audio = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| DentassistError::InputHeader(format!("multipart read: {e}")))?
                {
                    if (audio.len() + chunk.len()) as u64 > max_bytes {
                        return Err(DentassistError::InputTooLarge {
                            limit_bytes: max_bytes,
                        });
                    }
                    audio.extend_from_slice(&chunk);
                }
                upload = Some((filename, extension, audio));
            }
            Some("language") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| DentassistError::InputHeader(format!("multipart: {e}")))?;
                if !value.trim().is_empty() {
                    language = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, extension, audio) = upload.ok_or(DentassistError::InputFilenameMissing)?;
    if audio.is_empty() {
        return Err(DentassistError::InputEmpty);
    }
    Ok(AudioUpload {
        filename,
        extension,
        audio,
        language,
    })
}

/// POST /summarize -- text to note, unary.
pub async fn post_summarize(
    state: State<GatewayState>,
    request_id: Extension<RequestId>,
    body: Json<SummaryRequest>,
) -> Response {
    summarize_unary(state, request_id, body, false).await
}

/// POST /summarize-rag -- RAG-augmented unary.
pub async fn post_summarize_rag(
    state: State<GatewayState>,
    request_id: Extension<RequestId>,
    body: Json<SummaryRequest>,
) -> Response {
    summarize_unary(state, request_id, body, true).await
}

async fn summarize_unary(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<SummaryRequest>,
    use_rag: bool,
) -> Response {
    let action = if use_rag {
        AuditAction::SummarizeRag
    } else {
        AuditAction::Summarize
    };

    if state.scheduler.is_overloaded(QueueKind::Generate) {
        let err = DentassistError::InferenceBusy {
            retry_after_secs: 5,
        };
        state.audit.record(
            action,
            "",
            "smartnote",
            &request_id,
            AuditOutcome::Failure,
            err.kind(),
        );
        return ApiError::new(err, request_id).into_response();
    }

    let ctx = request_context(&state, &request_id);
    match state.pipeline.summarize(&body.text, use_rag, &ctx).await {
        Ok(outcome) => {
            state.audit.record(
                action,
                "",
                "smartnote",
                &request_id,
                AuditOutcome::Success,
                "",
            );
            if use_rag {
                Json(RagSummaryResponse {
                    summary: outcome.note,
                    rag_enhanced: outcome.rag_enhanced,
                    sources_used: outcome.sources_used,
                })
                .into_response()
            } else {
                Json(SummaryResponse {
                    summary: outcome.note,
                })
                .into_response()
            }
        }
        Err(err) => {
            state.audit.record(
                action,
                "",
                "smartnote",
                &request_id,
                AuditOutcome::Failure,
                err.kind(),
            );
            ApiError::new(err, request_id).into_response()
        }
    }
}

/// POST /summarize-stream -- text to note over SSE.
pub async fn post_summarize_stream(
    state: State<GatewayState>,
    request_id: Extension<RequestId>,
    body: Json<SummaryRequest>,
) -> Response {
    summarize_stream(state, request_id, body, false).await
}

/// POST /summarize-stream-rag -- RAG-augmented SSE.
pub async fn post_summarize_stream_rag(
    state: State<GatewayState>,
    request_id: Extension<RequestId>,
    body: Json<SummaryRequest>,
) -> Response {
    summarize_stream(state, request_id, body, true).await
}

async fn summarize_stream(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<SummaryRequest>,
    use_rag: bool,
) -> Response {
    let action = if use_rag {
        AuditAction::SummarizeStreamRag
    } else {
        AuditAction::SummarizeStream
    };

    if state.scheduler.is_overloaded(QueueKind::Generate) {
        let err = DentassistError::InferenceBusy {
            retry_after_secs: 5,
        };
        state.audit.record(
            action,
            "",
            "smartnote",
            &request_id,
            AuditOutcome::Failure,
            err.kind(),
        );
        return ApiError::new(err, request_id).into_response();
    }

    let ctx = request_context(&state, &request_id);
    match state
        .pipeline
        .summarize_stream(&body.text, use_rag, &ctx)
        .await
    {
        // The pump task owns this request's audit entry from here on.
        Ok(note_stream) => sse_response(note_stream),
        Err(err) => {
            state.audit.record(
                action,
                "",
                "smartnote",
                &request_id,
                AuditOutcome::Failure,
                err.kind(),
            );
            ApiError::new(err, request_id).into_response()
        }
    }
}

/// Frames a note stream as SSE: one metadata event, chunk events, then a
/// terminal error envelope or the `[DONE]` sentinel.
fn sse_response(note_stream: NoteStream) -> Response {
    let meta = serde_json::json!({ "rag_enhanced": note_stream.rag_enhanced }).to_string();
    let first = futures::stream::once(async move {
        Ok::<Event, Infallible>(Event::default().data(meta))
    });

    let events = futures::stream::unfold(note_stream.events, |mut rx| async move {
        let event = rx.recv().await?;
        let sse_event = match event {
            NoteEvent::Chunk(chunk) => {
                Event::default().data(serde_json::json!({ "chunk": chunk }).to_string())
            }
            NoteEvent::Error(err) => Event::default().data(
                serde_json::json!({
                    "error_code": err.kind(),
                    "message": err.to_string(),
                })
                .to_string(),
            ),
            NoteEvent::Done => Event::default().data("[DONE]"),
        };
        Some((Ok::<Event, Infallible>(sse_event), rx))
    });

    (
        [("cache-control", "no-cache"), ("x-accel-buffering", "no")],
        Sse::new(first.chain(events).boxed()),
    )
        .into_response()
}

/// POST /consultations/save -- persist a completed note.
pub async fn post_consultations_save(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<SaveConsultationRequest>,
) -> Response {
    let resource = body.patient_id.clone().unwrap_or_else(|| "consultation".to_string());
    let audit_exit = |outcome: AuditOutcome, detail: &str| {
        state.audit.record(
            AuditAction::ConsultationSave,
            &body.dentist_name,
            &resource,
            &request_id,
            outcome,
            detail,
        );
    };

    if body.smartnote.trim().is_empty() {
        let err = DentassistError::InputEmpty;
        audit_exit(AuditOutcome::Failure, err.kind());
        return ApiError::new(err, request_id.clone()).into_response();
    }

    let record = ConsultationRecord {
        correlation_id: request_id.clone(),
        created_at: Utc::now(),
        patient_id: body.patient_id.clone(),
        dentist_name: body.dentist_name.clone(),
        consultation_type: body.consultation_type.clone(),
        transcription: body.transcription.clone(),
        digest: note_digest(&body.smartnote),
        note: body.smartnote.clone(),
    };

    match state.rag.save_consultation(&record).await {
        Ok(()) => {
            audit_exit(AuditOutcome::Success, "");
            Json(serde_json::json!({
                "status": "saved",
                "date": record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            }))
            .into_response()
        }
        Err(err) => {
            audit_exit(AuditOutcome::Failure, err.kind());
            ApiError::new(err, request_id.clone()).into_response()
        }
    }
}

/// POST /consultations/search -- semantic search over past notes.
pub async fn post_consultations_search(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<SearchRequest>,
) -> Response {
    let audit_exit = |outcome: AuditOutcome, detail: &str| {
        state.audit.record(
            AuditAction::ConsultationSearch,
            "",
            "query",
            &request_id,
            outcome,
            detail,
        );
    };

    let query = sanitize_input(&body.query, state.limits.max_query_chars);
    if query.is_empty() {
        let err = DentassistError::InputEmpty;
        audit_exit(AuditOutcome::Failure, err.kind());
        return ApiError::new(err, request_id.clone()).into_response();
    }
    let top_k = body.top_k.unwrap_or(10).clamp(1, state.limits.top_k_max);

    match state.rag.search_consultations(&query, top_k).await {
        Ok(results) => {
            audit_exit(AuditOutcome::Success, "");
            Json(serde_json::json!({ "count": results.len(), "results": results }))
                .into_response()
        }
        Err(err) => {
            audit_exit(AuditOutcome::Failure, err.kind());
            ApiError::new(err, request_id.clone()).into_response()
        }
    }
}

/// GET /consultations/export -- full journal dump, insertion order.
pub async fn get_consultations_export(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Response {
    let consultations = state.rag.journal().export();
    state.audit.record(
        AuditAction::ConsultationExport,
        "",
        "all",
        &request_id,
        AuditOutcome::Success,
        "",
    );
    Json(serde_json::json!({
        "count": consultations.len(),
        "consultations": consultations,
    }))
    .into_response()
}

/// GET /rag/status -- readiness and collection counts.
pub async fn get_rag_status(State(state): State<GatewayState>) -> Response {
    Json(state.rag.status()).into_response()
}

/// POST /setup/download -- start fetching model weights.
pub async fn post_setup_download(
    State(state): State<GatewayState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Response {
    match state.downloads.start() {
        Ok(()) => {
            state.audit.record(
                AuditAction::ModelDownload,
                "",
                "models",
                &request_id,
                AuditOutcome::Success,
                "",
            );
            Json(serde_json::json!({ "status": "started" })).into_response()
        }
        Err(err) => ApiError::new(err, request_id).into_response(),
    }
}

/// GET /setup/progress -- download progress snapshot.
pub async fn get_setup_progress(State(state): State<GatewayState>) -> Response {
    Json(state.downloads.progress()).into_response()
}
