// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration, platform paths, and hardware detection for dentassist.

pub mod hardware;
pub mod loader;
pub mod model;
pub mod platform;

pub use hardware::detect_profile;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{AppConfig, EnvMode, GroupRate, DEFAULT_DEV_KEY};
pub use platform::{
    audit_path, data_dir, ensure_data_dir, journal_path, models_dir, rag_data_dir, DATA_DIR_ENV,
};
