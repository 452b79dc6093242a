// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dentassist serve` command implementation.
//!
//! Wires the whole backend: config and data directory, audit trail, RAG
//! store with recovery rebuild, scheduler sized for the hardware profile,
//! model backends, and the HTTP gateway. Supports graceful shutdown via
//! SIGTERM/SIGINT: stop admissions, cancel waiters, drain running work.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dentassist_audit::AuditLog;
use dentassist_config::model::EnvMode;
use dentassist_config::{self as config, AppConfig};
use dentassist_core::{DentassistError, GenerativeModel, SpeechRecognizer, TextEmbedder};
use dentassist_gateway::{GatewayState, MetricsCollector, RateLimiter};
use dentassist_pipeline::{PipelineConfig, SmartNotePipeline};
use dentassist_rag::{seed_knowledge, RagCoordinator};
use dentassist_runtime::{
    embedding_specs, generative_spec, LlamaServerModel, ModelDownloadManager,
    WhisperServerRecognizer,
};
use dentassist_scheduler::{QueueOptions, Scheduler, SchedulerOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the backend until a shutdown signal arrives.
pub async fn run_serve(config_path: Option<PathBuf>) -> Result<(), DentassistError> {
    let config = load(config_path)?;
    init_tracing(&config.log.level);

    // Fail-closed in production: no configured key, no service.
    if config.auth.env == EnvMode::Production && !config.auth.key_configured() {
        return Err(DentassistError::AuthMisconfigured);
    }
    if config.auth.key_configured() {
        info!("API key configured from environment");
    } else {
        warn!("using the default development API key; set APP_API_KEY for production");
    }

    let data_dir = config::ensure_data_dir()
        .map_err(|e| DentassistError::StoragePersist(format!("create data dir: {e}")))?;
    info!(path = %data_dir.display(), "data directory ready");

    let profile = config::detect_profile();

    let audit = Arc::new(
        AuditLog::open(config::audit_path(&data_dir))
            .map_err(|e| DentassistError::StoragePersist(format!("open audit log: {e}")))?,
    );

    let scheduler = Arc::new(Scheduler::for_profile(
        profile,
        scheduler_options(&config),
    ));

    let embedder = build_embedder(&data_dir);

    let rag = Arc::new(
        RagCoordinator::open(
            config::journal_path(&data_dir),
            config::rag_data_dir(&data_dir).join("index.json"),
            embedder,
            Arc::clone(&scheduler),
            Arc::clone(&audit),
            config.rag.clone(),
        )
        .map_err(|e| DentassistError::StoragePersist(format!("open journal: {e}")))?,
    );

    // Seed the knowledge base on first run; a missing embedder only defers
    // this to a later start, it never blocks serving.
    if rag.status().knowledge_count == 0 {
        match rag.ingest_knowledge(&seed_knowledge()).await {
            Ok(written) => info!(chunks = written, "seeded dental knowledge base"),
            Err(err) => warn!(error = %err, "knowledge seeding skipped"),
        }
    }
    if rag.needs_rebuild() {
        rag.spawn_rebuild();
    }

    let speech: Arc<dyn SpeechRecognizer> =
        Arc::new(WhisperServerRecognizer::new(&config.runtime.whisper_url));
    let generator: Arc<dyn GenerativeModel> =
        Arc::new(LlamaServerModel::new(&config.runtime.llama_url));

    let pipeline = Arc::new(SmartNotePipeline::new(
        Arc::clone(&scheduler),
        Arc::clone(&rag),
        Arc::clone(&speech),
        Arc::clone(&generator),
        Arc::clone(&audit),
        PipelineConfig {
            max_text_chars: config.limits.max_text_chars,
            max_tokens: config.runtime.max_tokens,
            temperature: config.runtime.temperature,
            generation_deadline: Duration::from_secs(config.runtime.generation_deadline_secs),
            transcribe_deadline: Duration::from_secs(config.runtime.transcribe_deadline_secs),
        },
    ));

    let models_dir = config::models_dir(&data_dir);
    let mut specs = vec![generative_spec(profile, &models_dir)];
    specs.extend(embedding_specs(&models_dir));
    let downloads = Arc::new(ModelDownloadManager::new(specs));

    let shutdown = install_signal_handler();
    let state = GatewayState {
        expected_api_key: Arc::new(config.auth.expected_key().to_string()),
        pipeline,
        rag,
        scheduler: Arc::clone(&scheduler),
        audit,
        metrics: Arc::new(MetricsCollector::new()),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
        downloads,
        limits: Arc::new(config.limits.clone()),
        speech,
        generator,
        shutdown: shutdown.clone(),
    };

    info!(profile = %profile, "backend starting");
    dentassist_gateway::serve(
        &config.server.host,
        config.server.port,
        state,
        shutdown.clone(),
    )
    .await?;

    scheduler
        .shutdown(Duration::from_secs(config.scheduler.drain_secs))
        .await;
    info!("dentassist serve shutdown complete");
    Ok(())
}

/// Prints the resolved configuration and data directory.
pub fn print_config(config_path: Option<PathBuf>) -> Result<(), DentassistError> {
    let config = load(config_path)?;
    println!("data_dir  = {}", config::data_dir().display());
    println!("server    = {}:{}", config.server.host, config.server.port);
    println!(
        "auth      = {} (key configured: {})",
        match config.auth.env {
            EnvMode::Production => "production",
            EnvMode::Development => "development",
        },
        config.auth.key_configured()
    );
    println!("llama     = {}", config.runtime.llama_url);
    println!("whisper   = {}", config.runtime.whisper_url);
    Ok(())
}

fn load(config_path: Option<PathBuf>) -> Result<AppConfig, DentassistError> {
    let result = match config_path {
        Some(path) => config::load_config_from_path(&path),
        None => config::load_config(),
    };
    result.map_err(|e| DentassistError::SystemInternal(format!("configuration: {e}")))
}

fn scheduler_options(config: &AppConfig) -> SchedulerOptions {
    let base = |workers: usize| QueueOptions {
        workers,
        wait_cap: config.scheduler.wait_cap,
        wait_budget: Duration::from_secs(config.scheduler.wait_budget_secs),
        retry_after_secs: config.scheduler.retry_after_secs,
    };
    SchedulerOptions {
        speech: base(config.scheduler.speech_workers),
        generate: base(config.scheduler.generate_workers),
        embed: base(config.scheduler.embed_workers),
    }
}

/// Selects the embedder backend. Without the `onnx` feature (or without
/// model files) RAG runs degraded: saves journal, retrieval defers.
#[cfg(feature = "onnx")]
fn build_embedder(data_dir: &std::path::Path) -> Arc<dyn TextEmbedder> {
    let model_dir = config::models_dir(data_dir).join("all-MiniLM-L6-v2");
    match dentassist_runtime::OnnxEmbedder::load(&model_dir) {
        Ok(embedder) => {
            info!("onnx embedder loaded");
            Arc::new(embedder)
        }
        Err(err) => {
            warn!(error = %err, "embedding model unavailable, RAG degraded until downloaded");
            Arc::new(dentassist_runtime::NotReadyEmbedder)
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(_data_dir: &std::path::Path) -> Arc<dyn TextEmbedder> {
    info!("onnx feature disabled, RAG embedding degraded");
    Arc::new(dentassist_runtime::NotReadyEmbedder)
}

/// Installs handlers for SIGTERM and SIGINT; the returned token cancels
/// when either fires.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, initiating shutdown"),
                _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        handler_token.cancel();
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dentassist={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
