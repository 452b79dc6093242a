// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the dentassist backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level backend configuration.
///
/// Loaded from `dentassist.toml` with `DENTASSIST_*` environment overrides;
/// a handful of first-class variables (`APP_API_KEY`, `ENV`,
/// `DENTAL_ASSISTANT_DATA_DIR`) are applied on top by the loader.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server bind settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request validation limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Inference scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Rate limiting per endpoint group.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// RAG retrieval and rebuild settings.
    #[serde(default)]
    pub rag: RagConfig,

    /// Local model runtime endpoints and generation defaults.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Server bind configuration. Loopback only by design.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Execution environment: development falls back to a fixed dev key,
/// production refuses to start without a configured key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvMode {
    Development,
    Production,
}

impl Default for EnvMode {
    fn default() -> Self {
        Self::Development
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Expected `X-API-Key` value. `None` means not explicitly configured.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Execution environment.
    #[serde(default)]
    pub env: EnvMode,
}

/// Default development API key, matching the desktop shell default so the
/// app works out of the box.
pub const DEFAULT_DEV_KEY: &str = "dental-assistant-local-dev-key";

impl AuthConfig {
    /// The key requests must present: configured key, else the dev default.
    pub fn expected_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or(DEFAULT_DEV_KEY)
    }

    /// True when a key was explicitly configured.
    pub fn key_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Request validation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Streamed upload cap in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Cap on sanitised text length in characters.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Cap on search query length in characters.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// Upper clamp for `top_k` search parameters.
    #[serde(default = "default_top_k_max")]
    pub top_k_max: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_text_chars: default_max_text_chars(),
            max_query_chars: default_max_query_chars(),
            top_k_max: default_top_k_max(),
        }
    }
}

/// Inference scheduler tuning.
///
/// Worker counts are per queue; `generate_workers` is raised to 2 on
/// `high_vram` hardware unless explicitly configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_one")]
    pub speech_workers: usize,
    #[serde(default = "default_one")]
    pub generate_workers: usize,
    #[serde(default = "default_one")]
    pub embed_workers: usize,
    /// Bounded waiting list size per queue.
    #[serde(default = "default_wait_cap")]
    pub wait_cap: usize,
    /// How long a submission may sit in the waiting list before it is
    /// rejected with `busy`.
    #[serde(default = "default_wait_budget_secs")]
    pub wait_budget_secs: u64,
    /// Retry hint returned with `busy` rejections.
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
    /// Drain period granted to running work at shutdown.
    #[serde(default = "default_drain_secs")]
    pub drain_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            speech_workers: 1,
            generate_workers: 1,
            embed_workers: 1,
            wait_cap: default_wait_cap(),
            wait_budget_secs: default_wait_budget_secs(),
            retry_after_secs: default_retry_after_secs(),
            drain_secs: default_drain_secs(),
        }
    }
}

/// Token bucket parameters for one endpoint group.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GroupRate {
    /// Sustained refill rate, requests per minute.
    pub per_minute: u32,
    /// Bucket capacity (burst allowance).
    pub burst: u32,
}

/// Rate limiting per `(client_host, endpoint_group)`.
///
/// Group defaults mirror the relative cost of the endpoints: inference is
/// slow anyway, status endpoints are cheap.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// LLM inference and transcription endpoints.
    #[serde(default = "default_heavy_rate")]
    pub heavy: GroupRate,
    /// Consultation saves/searches, RAG, model downloads.
    #[serde(default = "default_moderate_rate")]
    pub moderate: GroupRate,
    /// Health, status, metrics.
    #[serde(default = "default_light_rate")]
    pub light: GroupRate,
    /// Cardinality cap on the bucket store. On overflow the oldest idle
    /// bucket is evicted, one at a time -- the store is never flushed.
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heavy: default_heavy_rate(),
            moderate: default_moderate_rate(),
            light: default_light_rate(),
            max_buckets: default_max_buckets(),
        }
    }
}

/// RAG retrieval and rebuild settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RagConfig {
    /// Passages retrieved for prompt grounding.
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Default `top_k` for consultation search when the caller omits it.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
    /// Batch size for embedding during rebuild and seeding.
    #[serde(default = "default_rebuild_batch")]
    pub rebuild_batch: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            retrieval_k: default_retrieval_k(),
            search_k: default_search_k(),
            rebuild_batch: default_rebuild_batch(),
        }
    }
}

/// Local model runtime endpoints and generation defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Base URL of the local llama.cpp completion server.
    #[serde(default = "default_llama_url")]
    pub llama_url: String,
    /// Base URL of the local whisper.cpp transcription server.
    #[serde(default = "default_whisper_url")]
    pub whisper_url: String,
    /// Generation token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Deadline for one generation call.
    #[serde(default = "default_generation_deadline_secs")]
    pub generation_deadline_secs: u64,
    /// Deadline for one transcription call.
    #[serde(default = "default_transcribe_deadline_secs")]
    pub transcribe_deadline_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llama_url: default_llama_url(),
            whisper_url: default_whisper_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            generation_deadline_secs: default_generation_deadline_secs(),
            transcribe_deadline_secs: default_transcribe_deadline_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_max_text_chars() -> usize {
    50_000
}

fn default_max_query_chars() -> usize {
    500
}

fn default_top_k_max() -> usize {
    50
}

fn default_one() -> usize {
    1
}

fn default_wait_cap() -> usize {
    16
}

fn default_wait_budget_secs() -> u64 {
    30
}

fn default_retry_after_secs() -> u64 {
    5
}

fn default_drain_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_heavy_rate() -> GroupRate {
    GroupRate {
        per_minute: 6,
        burst: 6,
    }
}

fn default_moderate_rate() -> GroupRate {
    GroupRate {
        per_minute: 30,
        burst: 30,
    }
}

fn default_light_rate() -> GroupRate {
    GroupRate {
        per_minute: 120,
        burst: 120,
    }
}

fn default_max_buckets() -> usize {
    1024
}

fn default_retrieval_k() -> usize {
    4
}

fn default_search_k() -> usize {
    10
}

fn default_rebuild_batch() -> usize {
    32
}

fn default_llama_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_whisper_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.3
}

fn default_generation_deadline_secs() -> u64 {
    120
}

fn default_transcribe_deadline_secs() -> u64 {
    180
}

fn default_log_level() -> String {
    "info".to_string()
}
