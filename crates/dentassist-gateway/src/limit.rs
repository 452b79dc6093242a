// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Early request-size rejection and rate-limit admission middleware.
//!
//! The `Content-Length` check only catches requests that declare a length;
//! the transcription handler still enforces the same cap while streaming
//! the multipart body, because the header cannot be trusted.

use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dentassist_core::DentassistError;

use crate::error::ApiError;
use crate::ratelimit::{classify, Decision};
use crate::state::GatewayState;
use crate::trace::RequestId;

fn request_id_of(request: &Request) -> String {
    request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Rejects oversized payloads before any body byte is read.
pub async fn body_limit_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(raw) = request.headers().get("content-length") {
        let parsed = raw.to_str().ok().and_then(|v| v.parse::<u64>().ok());
        match parsed {
            None => {
                tracing::warn!("malformed content-length header");
                return ApiError::new(
                    DentassistError::InputHeader("unparsable Content-Length".into()),
                    request_id_of(&request),
                )
                .into_response();
            }
            Some(length) if length > state.limits.max_upload_bytes => {
                tracing::warn!(
                    content_length = length,
                    limit = state.limits.max_upload_bytes,
                    "request blocked by size limit"
                );
                return ApiError::new(
                    DentassistError::InputTooLarge {
                        limit_bytes: state.limits.max_upload_bytes,
                    },
                    request_id_of(&request),
                )
                .into_response();
            }
            Some(_) => {}
        }
    }
    next.run(request).await
}

/// Token-bucket admission per `(client_host, endpoint_group)`.
pub async fn rate_limit_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.enabled() || request.method() == axum::http::Method::OPTIONS {
        return next.run(request).await;
    }

    let host = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string());
    let group = classify(request.uri().path());

    match state.rate_limiter.check(&host, group, Instant::now()) {
        Decision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Decision::Limited {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!(
                host = host.as_str(),
                group = %group,
                limit,
                "rate limit exceeded"
            );
            let mut response = ApiError::new(
                DentassistError::SystemRateLimited { retry_after_secs },
                request_id_of(&request),
            )
            .into_response();
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            response
        }
    }
}
