// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the dental assistant backend.
//!
//! Every error carries a stable machine-readable code (`DOMAIN_NNN`) and an
//! HTTP status, so the gateway can translate any failure into the wire
//! envelope without inspecting messages. Variants are cheap to clone: detail
//! strings instead of boxed sources, because results are fanned out to
//! single-flight followers and SSE error events.

use thiserror::Error;

/// The primary error type used across all dentassist crates.
#[derive(Debug, Clone, Error)]
pub enum DentassistError {
    /// `X-API-Key` header absent on an authenticated endpoint.
    #[error("API key header is missing")]
    AuthMissing,

    /// `X-API-Key` present but does not match the configured key.
    #[error("invalid API key")]
    AuthInvalid,

    /// Production mode without a configured API key.
    #[error("API key must be configured in production mode; set APP_API_KEY")]
    AuthMisconfigured,

    /// Text input empty or empty after sanitisation.
    #[error("text input is empty or invalid after sanitisation")]
    InputEmpty,

    /// Uploaded file carries no filename.
    #[error("uploaded file is missing a filename")]
    InputFilenameMissing,

    /// Uploaded file extension not in the accepted set.
    #[error("unsupported file extension: {0}")]
    InputExtension(String),

    /// Request body exceeds the configured upload cap.
    #[error("request entity too large (limit {limit_bytes} bytes)")]
    InputTooLarge { limit_bytes: u64 },

    /// Malformed framing header (e.g. unparsable `Content-Length`).
    #[error("malformed request header: {0}")]
    InputHeader(String),

    /// Model weights absent or the backend is not reachable yet.
    #[error("model not ready: {0}")]
    ModelNotReady(String),

    /// A runtime the backend needs is not installed/compiled in.
    #[error("model dependency missing: {0}")]
    ModelDependencyMissing(String),

    /// Scheduler queue full or the service is shedding load.
    #[error("server is busy processing other requests")]
    InferenceBusy { retry_after_secs: u64 },

    /// Submission cancelled: client disconnect, explicit abort, or deadline.
    #[error("inference cancelled")]
    InferenceCancelled,

    /// The model backend raised during inference.
    #[error("inference failed: {0}")]
    InferenceRuntime(String),

    /// Failure while a token stream was already in flight.
    #[error("error during streaming generation: {0}")]
    InferenceStream(String),

    /// Journal or audit write failure (disk full, permissions).
    #[error("persist failed: {0}")]
    StoragePersist(String),

    /// A model download is already running.
    #[error("a download is already in progress")]
    DownloadInProgress,

    /// Model download failed.
    #[error("model download failed: {0}")]
    DownloadFailed(String),

    /// Backend not finished starting up.
    #[error("backend is not ready yet")]
    SystemNotReady,

    /// Client closed the connection before processing completed.
    #[error("client closed the connection before processing completed")]
    SystemDisconnected,

    /// Token bucket for this client/endpoint group is exhausted.
    #[error("too many requests, please slow down")]
    SystemRateLimited { retry_after_secs: u64 },

    /// Anything unexpected.
    #[error("internal server error: {0}")]
    SystemInternal(String),
}

impl DentassistError {
    /// Stable wire code, `DOMAIN_NNN`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthMissing => "AUTH_001",
            Self::AuthInvalid => "AUTH_002",
            Self::AuthMisconfigured => "AUTH_003",
            Self::InputEmpty => "INPUT_001",
            Self::InputFilenameMissing => "INPUT_002",
            Self::InputExtension(_) => "INPUT_003",
            Self::InputTooLarge { .. } => "INPUT_004",
            Self::InputHeader(_) => "INPUT_005",
            Self::ModelNotReady(_) => "MODEL_001",
            Self::ModelDependencyMissing(_) => "MODEL_002",
            Self::InferenceBusy { .. } => "INFERENCE_001",
            Self::InferenceCancelled => "INFERENCE_002",
            Self::InferenceRuntime(_) => "INFERENCE_003",
            Self::InferenceStream(_) => "INFERENCE_004",
            Self::StoragePersist(_) => "STORAGE_001",
            Self::DownloadInProgress => "DOWNLOAD_001",
            Self::DownloadFailed(_) => "DOWNLOAD_002",
            Self::SystemNotReady => "SYSTEM_001",
            Self::SystemDisconnected => "SYSTEM_002",
            Self::SystemRateLimited { .. } => "SYSTEM_003",
            Self::SystemInternal(_) => "SYSTEM_004",
        }
    }

    /// Slash-separated kind tag used in logs and metrics breakdowns.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthMissing => "auth/missing",
            Self::AuthInvalid => "auth/invalid",
            Self::AuthMisconfigured => "auth/misconfigured",
            Self::InputEmpty => "input/empty",
            Self::InputFilenameMissing => "input/filename_missing",
            Self::InputExtension(_) => "input/extension",
            Self::InputTooLarge { .. } => "input/too_large",
            Self::InputHeader(_) => "input/header",
            Self::ModelNotReady(_) => "model/not_ready",
            Self::ModelDependencyMissing(_) => "model/dependency_missing",
            Self::InferenceBusy { .. } => "inference/busy",
            Self::InferenceCancelled => "inference/cancelled",
            Self::InferenceRuntime(_) => "inference/runtime",
            Self::InferenceStream(_) => "inference/stream",
            Self::StoragePersist(_) => "storage/persist",
            Self::DownloadInProgress => "download/in_progress",
            Self::DownloadFailed(_) => "download/failed",
            Self::SystemNotReady => "system/not_ready",
            Self::SystemDisconnected => "system/disconnected",
            Self::SystemRateLimited { .. } => "system/rate_limited",
            Self::SystemInternal(_) => "system/internal",
        }
    }

    /// HTTP status the gateway responds with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthMissing | Self::AuthInvalid => 403,
            Self::AuthMisconfigured => 500,
            Self::InputEmpty
            | Self::InputFilenameMissing
            | Self::InputExtension(_)
            | Self::InputHeader(_) => 400,
            Self::InputTooLarge { .. } => 413,
            Self::ModelNotReady(_) | Self::ModelDependencyMissing(_) => 503,
            Self::InferenceBusy { .. } => 503,
            Self::InferenceCancelled | Self::SystemDisconnected => 499,
            Self::InferenceRuntime(_) | Self::InferenceStream(_) => 500,
            Self::StoragePersist(_) => 500,
            Self::DownloadInProgress => 409,
            Self::DownloadFailed(_) => 500,
            Self::SystemNotReady => 503,
            Self::SystemRateLimited { .. } => 429,
            Self::SystemInternal(_) => 500,
        }
    }

    /// Retry hint in seconds, when one applies (busy / rate-limited).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::InferenceBusy { retry_after_secs }
            | Self::SystemRateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_unique() {
        let all = [
            DentassistError::AuthMissing,
            DentassistError::AuthInvalid,
            DentassistError::AuthMisconfigured,
            DentassistError::InputEmpty,
            DentassistError::InputFilenameMissing,
            DentassistError::InputExtension(".exe".into()),
            DentassistError::InputTooLarge { limit_bytes: 1 },
            DentassistError::InputHeader("content-length".into()),
            DentassistError::ModelNotReady("weights".into()),
            DentassistError::ModelDependencyMissing("onnx".into()),
            DentassistError::InferenceBusy { retry_after_secs: 5 },
            DentassistError::InferenceCancelled,
            DentassistError::InferenceRuntime("boom".into()),
            DentassistError::InferenceStream("boom".into()),
            DentassistError::StoragePersist("disk full".into()),
            DentassistError::DownloadInProgress,
            DentassistError::DownloadFailed("404".into()),
            DentassistError::SystemNotReady,
            DentassistError::SystemDisconnected,
            DentassistError::SystemRateLimited { retry_after_secs: 1 },
            DentassistError::SystemInternal("oops".into()),
        ];
        let mut codes: Vec<&str> = all.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        let before = codes.len();
        codes.dedup();
        assert_eq!(before, codes.len(), "duplicate error code");
    }

    #[test]
    fn auth_errors_are_forbidden() {
        assert_eq!(DentassistError::AuthMissing.http_status(), 403);
        assert_eq!(DentassistError::AuthInvalid.http_status(), 403);
    }

    #[test]
    fn busy_carries_retry_hint() {
        let err = DentassistError::InferenceBusy { retry_after_secs: 7 };
        assert_eq!(err.http_status(), 503);
        assert_eq!(err.retry_after_secs(), Some(7));
        assert_eq!(err.kind(), "inference/busy");
    }

    #[test]
    fn too_large_maps_to_413() {
        let err = DentassistError::InputTooLarge { limit_bytes: 100 };
        assert_eq!(err.http_status(), 413);
        assert_eq!(err.code(), "INPUT_004");
    }
}
