// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error-to-envelope translation.
//!
//! Every non-2xx response carries the same JSON shape:
//! `{error_code, code, message, detail?, request_id}` where `error_code` is
//! the slash-separated kind (what clients switch on) and `code` the stable
//! `DOMAIN_NNN` tag used in logs and support bundles.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dentassist_core::DentassistError;
use serde::Serialize;

/// Marker inserted into response extensions so the trace middleware can
/// attribute errors to a kind without re-parsing bodies.
#[derive(Debug, Clone, Copy)]
pub struct ErrorKindTag(pub &'static str);

/// A typed error bound to its request id, ready to become a response.
#[derive(Debug)]
pub struct ApiError {
    pub error: DentassistError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: DentassistError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error_code: &'a str,
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    request_id: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let retry_after = self.error.retry_after_secs();
        let envelope = ErrorEnvelope {
            error_code: self.error.kind(),
            code: self.error.code(),
            message: self.error.to_string(),
            detail: retry_after.map(|secs| format!("retry after {secs}s")),
            request_id: &self.request_id,
        };

        let mut response = (status, Json(&envelope)).into_response();
        response
            .extensions_mut()
            .insert(ErrorKindTag(self.error.kind()));
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}
