// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request tracing: correlation ids, structured request logs, metrics feed.
//!
//! Outermost middleware, so it observes the full lifecycle including
//! rate-limit and size-limit rejections. Reuses a client-supplied
//! `X-Request-ID` when present, otherwise mints one.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ErrorKindTag;
use crate::state::GatewayState;

/// Correlation id of the current request, available to handlers as an
/// extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Mints a 12-hex-char correlation id.
pub fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

pub async fn trace_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(new_request_id);

    let method = request.method().to_string();
    // The route template, not the raw path, to keep metric cardinality flat.
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));
    state.metrics.request_started();
    let start = Instant::now();

    let mut response = next.run(request).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();
    let error_kind = response.extensions().get::<ErrorKindTag>().map(|tag| tag.0);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    if status >= 400 {
        tracing::warn!(
            method = method.as_str(),
            path = path.as_str(),
            status,
            latency_ms = latency_ms as u64,
            request_id = request_id.as_str(),
            error_kind,
            "request failed"
        );
    } else {
        tracing::info!(
            method = method.as_str(),
            path = path.as_str(),
            status,
            latency_ms = latency_ms as u64,
            request_id = request_id.as_str(),
            "request"
        );
    }

    state
        .metrics
        .request_finished(&method, &path, status, latency_ms, &request_id, error_kind);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_short_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
