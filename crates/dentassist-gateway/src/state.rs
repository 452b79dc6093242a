// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state for the axum request handlers.
//!
//! No process-wide singletons: everything a handler touches is threaded
//! through this struct, so tests assemble a full gateway from mocks.

use std::sync::Arc;

use dentassist_audit::AuditLog;
use dentassist_config::model::LimitsConfig;
use dentassist_core::{GenerativeModel, SpeechRecognizer};
use dentassist_pipeline::SmartNotePipeline;
use dentassist_rag::RagCoordinator;
use dentassist_runtime::ModelDownloadManager;
use dentassist_scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsCollector;
use crate::ratelimit::RateLimiter;

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct GatewayState {
    /// Expected `X-API-Key` value.
    pub expected_api_key: Arc<String>,
    pub pipeline: Arc<SmartNotePipeline>,
    pub rag: Arc<RagCoordinator>,
    pub scheduler: Arc<Scheduler>,
    pub audit: Arc<AuditLog>,
    pub metrics: Arc<MetricsCollector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub downloads: Arc<ModelDownloadManager>,
    pub limits: Arc<LimitsConfig>,
    /// Health-probe handles onto the model ports.
    pub speech: Arc<dyn SpeechRecognizer>,
    pub generator: Arc<dyn GenerativeModel>,
    /// Fires when shutdown begins; per-request aborts derive from it.
    pub shutdown: CancellationToken,
}
