// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model weight downloads for the `/setup/*` collaborator surface.
//!
//! One download run at a time. Files stream to a `.part` scratch path and
//! are renamed into place, so an interrupted download never leaves a
//! plausible-looking weight file behind. Filenames differ per hardware
//! profile to avoid accidental overwrites between quantisations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dentassist_core::{DentassistError, HardwareProfile};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// One file to fetch.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Display name for progress reporting.
    pub name: String,
    pub url: String,
    pub target: PathBuf,
}

/// Snapshot for `GET /setup/progress`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    /// `idle` | `downloading` | `completed` | `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub downloaded_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub percent: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadProgress {
    fn idle() -> Self {
        Self {
            status: "idle".to_string(),
            current_file: None,
            downloaded_bytes: 0,
            total_bytes: None,
            percent: 0.0,
            error: None,
        }
    }
}

/// Serialised, single-run model downloader.
pub struct ModelDownloadManager {
    specs: Vec<ModelSpec>,
    client: reqwest::Client,
    in_progress: AtomicBool,
    progress: Mutex<DownloadProgress>,
}

impl ModelDownloadManager {
    pub fn new(specs: Vec<ModelSpec>) -> Self {
        Self {
            specs,
            client: reqwest::Client::new(),
            in_progress: AtomicBool::new(false),
            progress: Mutex::new(DownloadProgress::idle()),
        }
    }

    /// True when every target file is already on disk.
    pub fn all_present(&self) -> bool {
        self.specs.iter().all(|spec| spec.target.exists())
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> DownloadProgress {
        self.progress
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Starts a background download of every missing file.
    ///
    /// Fails with `download/in_progress` when a run is already active.
    pub fn start(self: &Arc<Self>) -> Result<(), DentassistError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Err(DentassistError::DownloadInProgress);
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run().await;
            {
                let mut progress = this.progress.lock().unwrap_or_else(|p| p.into_inner());
                match outcome {
                    Ok(()) => {
                        progress.status = "completed".to_string();
                        progress.current_file = None;
                        progress.percent = 100.0;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "model download failed");
                        progress.status = "failed".to_string();
                        progress.error = Some(err.to_string());
                    }
                }
            }
            this.in_progress.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    async fn run(&self) -> Result<(), DentassistError> {
        for spec in &self.specs {
            if spec.target.exists() {
                continue;
            }
            self.fetch_one(spec).await?;
        }
        Ok(())
    }

    async fn fetch_one(&self, spec: &ModelSpec) -> Result<(), DentassistError> {
        tracing::info!(name = spec.name.as_str(), url = spec.url.as_str(), "downloading model");
        if let Some(parent) = spec.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DentassistError::DownloadFailed(format!("create model dir: {e}")))?;
        }

        let response = self
            .client
            .get(&spec.url)
            .send()
            .await
            .map_err(|e| DentassistError::DownloadFailed(format!("{}: {e}", spec.name)))?;
        if !response.status().is_success() {
            return Err(DentassistError::DownloadFailed(format!(
                "{}: HTTP {}",
                spec.name,
                response.status()
            )));
        }
        let total = response.content_length();
        {
            let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
            progress.status = "downloading".to_string();
            progress.current_file = Some(spec.name.clone());
            progress.downloaded_bytes = 0;
            progress.total_bytes = total;
            progress.percent = 0.0;
            progress.error = None;
        }

        let scratch = scratch_path(&spec.target);
        let mut file = tokio::fs::File::create(&scratch)
            .await
            .map_err(|e| DentassistError::DownloadFailed(format!("create scratch: {e}")))?;

        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| DentassistError::DownloadFailed(format!("stream: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DentassistError::DownloadFailed(format!("write: {e}")))?;
            downloaded += chunk.len() as u64;

            let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
            progress.downloaded_bytes = downloaded;
            if let Some(total) = total {
                progress.percent = (downloaded as f32 / total as f32) * 100.0;
            }
        }
        file.sync_all()
            .await
            .map_err(|e| DentassistError::DownloadFailed(format!("sync: {e}")))?;
        drop(file);

        tokio::fs::rename(&scratch, &spec.target)
            .await
            .map_err(|e| DentassistError::DownloadFailed(format!("finalize: {e}")))?;
        tracing::info!(name = spec.name.as_str(), "model download complete");
        Ok(())
    }
}

fn scratch_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

/// Generative weight file per hardware profile. Filenames differ per
/// quantisation so a profile change never silently reuses the wrong file.
pub fn generative_spec(profile: HardwareProfile, models_dir: &Path) -> ModelSpec {
    let (filename, url) = match profile {
        HardwareProfile::HighVram => (
            "llama-3-8b-instruct.Q6_K.gguf",
            "https://huggingface.co/TheBloke/Llama-3-8B-Instruct-GGUF/resolve/main/llama-3-8b-instruct.Q6_K.gguf",
        ),
        HardwareProfile::LowVram => (
            "llama-3-8b-instruct.Q4_K_M.gguf",
            "https://huggingface.co/TheBloke/Llama-3-8B-Instruct-GGUF/resolve/main/llama-3-8b-instruct.Q4_K_M.gguf",
        ),
        HardwareProfile::CpuOnly => (
            "llama-3-8b-instruct.Q4_K_S.gguf",
            "https://huggingface.co/TheBloke/Llama-3-8B-Instruct-GGUF/resolve/main/llama-3-8b-instruct.Q4_K_S.gguf",
        ),
    };
    ModelSpec {
        name: filename.to_string(),
        url: url.to_string(),
        target: models_dir.join(filename),
    }
}

/// Embedding model files (all-MiniLM-L6-v2, INT8 ONNX).
pub fn embedding_specs(models_dir: &Path) -> Vec<ModelSpec> {
    let dir = models_dir.join("all-MiniLM-L6-v2");
    vec![
        ModelSpec {
            name: "embedding model.onnx".to_string(),
            url: "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx".to_string(),
            target: dir.join("model.onnx"),
        },
        ModelSpec {
            name: "embedding tokenizer.json".to_string(),
            url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json".to_string(),
            target: dir.join("tokenizer.json"),
        },
    ]
}
