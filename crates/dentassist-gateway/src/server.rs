// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly and the serve loop.
//!
//! Middleware, innermost to outermost: auth (protected routes only), CORS,
//! size limit, rate limit, trace. Trace is outermost so correlation ids and
//! metrics cover everything, including rate-limit rejections.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use dentassist_core::DentassistError;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::auth_middleware;
use crate::handlers;
use crate::limit::{body_limit_middleware, rate_limit_middleware};
use crate::state::GatewayState;
use crate::trace::trace_middleware;

/// Builds the full application router around the shared state.
pub fn router(state: GatewayState) -> Router {
    // Unauthenticated liveness probe for the desktop shell boot sequence.
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/llm/status", get(handlers::get_llm_status))
        .route("/metrics", get(handlers::get_metrics))
        .route("/workers/status", get(handlers::get_workers_status))
        .route("/audit/recent", get(handlers::get_audit_recent))
        .route("/transcribe", post(handlers::post_transcribe))
        .route("/summarize", post(handlers::post_summarize))
        .route("/summarize-stream", post(handlers::post_summarize_stream))
        .route("/summarize-rag", post(handlers::post_summarize_rag))
        .route(
            "/summarize-stream-rag",
            post(handlers::post_summarize_stream_rag),
        )
        .route(
            "/consultations/save",
            post(handlers::post_consultations_save),
        )
        .route(
            "/consultations/search",
            post(handlers::post_consultations_search),
        )
        .route(
            "/consultations/export",
            get(handlers::get_consultations_export),
        )
        .route("/rag/status", get(handlers::get_rag_status))
        .route("/setup/download", post(handlers::post_setup_download))
        .route("/setup/progress", get(handlers::get_setup_progress))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let upload_limit = state.limits.max_upload_bytes as usize;

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(upload_limit + 1024 * 1024))
        .layer(cors_layer())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            body_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(state, trace_middleware))
}

/// Desktop-shell origins only; the service binds to loopback anyway.
fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:1420",
        "tauri://localhost",
        "https://tauri.localhost",
    ]
    .into_iter()
    .map(HeaderValue::from_static)
    .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
}

/// Binds and serves until the shutdown token fires.
pub async fn serve(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), DentassistError> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DentassistError::SystemInternal(format!("bind {addr}: {e}")))?;

    tracing::info!(addr = addr.as_str(), "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| DentassistError::SystemInternal(format!("gateway server: {e}")))
}
