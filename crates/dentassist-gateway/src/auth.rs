// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API-key authentication middleware.
//!
//! Every endpoint except the liveness probe requires `X-API-Key`. A
//! rejected call to a patient-data endpoint still produces its one audit
//! entry, with outcome `failure` -- denials are exactly the accesses the
//! trail exists for.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dentassist_core::{AuditAction, AuditOutcome, DentassistError};

use crate::error::ApiError;
use crate::state::GatewayState;
use crate::trace::RequestId;

/// Maps a request path to its audit action, when the endpoint touches
/// patient data.
pub fn audit_action_for_path(path: &str) -> Option<AuditAction> {
    match path {
        "/transcribe" => Some(AuditAction::Transcribe),
        "/summarize" => Some(AuditAction::Summarize),
        "/summarize-stream" => Some(AuditAction::SummarizeStream),
        "/summarize-rag" => Some(AuditAction::SummarizeRag),
        "/summarize-stream-rag" => Some(AuditAction::SummarizeStreamRag),
        "/consultations/save" => Some(AuditAction::ConsultationSave),
        "/consultations/search" => Some(AuditAction::ConsultationSearch),
        "/consultations/export" => Some(AuditAction::ConsultationExport),
        "/audit/recent" => Some(AuditAction::AuditRead),
        _ => None,
    }
}

pub async fn auth_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    let error = match presented {
        None => Some(DentassistError::AuthMissing),
        Some(key) if key != state.expected_api_key.as_str() => {
            Some(DentassistError::AuthInvalid)
        }
        Some(_) => None,
    };

    let Some(error) = error else {
        return next.run(request).await;
    };

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let path = request.uri().path();

    tracing::warn!(
        path,
        request_id = request_id.as_str(),
        kind = error.kind(),
        "rejected request credentials"
    );
    if let Some(action) = audit_action_for_path(path) {
        state.audit.record(
            action,
            "",
            path,
            &request_id,
            AuditOutcome::Failure,
            error.kind(),
        );
    }

    ApiError::new(error, request_id).into_response()
}
