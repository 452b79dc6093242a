// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, user config
//! file, `./dentassist.toml`, `DENTASSIST_*` environment variables. The
//! first-class variables `APP_API_KEY` and `ENV` are applied last so the
//! operator can override any file-based auth settings without touching TOML.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::{AppConfig, EnvMode};

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<AppConfig, figment::Error> {
    let figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("dentassist/dentassist.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("dentassist.toml"))
        .merge(env_provider());

    let mut config: AppConfig = figment.extract()?;
    apply_first_class_env(&mut config);
    Ok(config)
}

/// Load configuration from TOML content only (no file lookup, no env).
///
/// Used by tests and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<AppConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AppConfig, figment::Error> {
    let figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider());

    let mut config: AppConfig = figment.extract()?;
    apply_first_class_env(&mut config);
    Ok(config)
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `DENTASSIST_LIMITS_MAX_TEXT_CHARS` must
/// map to `limits.max_text_chars`, not `limits.max.text.chars`.
fn env_provider() -> Env {
    Env::prefixed("DENTASSIST_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("auth_", "auth.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("scheduler_", "scheduler.", 1)
            .replacen("rate_limit_", "rate_limit.", 1)
            .replacen("rag_", "rag.", 1)
            .replacen("runtime_", "runtime.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}

/// Apply the first-class environment variables shared with the original
/// deployment: `APP_API_KEY` and `ENV`.
fn apply_first_class_env(config: &mut AppConfig) {
    if let Ok(key) = std::env::var("APP_API_KEY") {
        if !key.is_empty() {
            config.auth.api_key = Some(key);
        }
    }
    if let Ok(env) = std::env::var("ENV") {
        if env.eq_ignore_ascii_case("production") {
            config.auth.env = EnvMode::Production;
        }
    }
}
