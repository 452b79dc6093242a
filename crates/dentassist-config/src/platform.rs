// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user data directory resolution.
//!
//! One directory holds everything the backend persists: model weights,
//! vector index, consultation journal, audit log. Resolution order is the
//! `DENTAL_ASSISTANT_DATA_DIR` override, then the per-OS user data dir.

use std::io;
use std::path::{Path, PathBuf};

/// Application directory name under the platform data dir.
const APP_DIR_NAME: &str = "DentalAssistant";

/// Environment override for the data directory.
pub const DATA_DIR_ENV: &str = "DENTAL_ASSISTANT_DATA_DIR";

/// Resolve the per-user data directory without creating it.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Resolve and create the data directory with owner-only permissions.
pub fn ensure_data_dir() -> io::Result<PathBuf> {
    let dir = data_dir();
    create_private_dir(&dir)?;
    Ok(dir)
}

/// Create a directory (and parents) readable only by the owning user.
pub fn create_private_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(path)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)
    }
}

/// Subdirectory for model weights.
pub fn models_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("models")
}

/// Subdirectory for vector index files.
pub fn rag_data_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("rag_data")
}

/// The consultation journal file (authoritative store).
pub fn journal_path(data_dir: &Path) -> PathBuf {
    data_dir.join("consultations.jsonl")
}

/// The audit log file.
pub fn audit_path(data_dir: &Path) -> PathBuf {
    data_dir.join("audit.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_stable() {
        let base = Path::new("/tmp/da");
        assert_eq!(models_dir(base), Path::new("/tmp/da/models"));
        assert_eq!(rag_data_dir(base), Path::new("/tmp/da/rag_data"));
        assert_eq!(journal_path(base), Path::new("/tmp/da/consultations.jsonl"));
        assert_eq!(audit_path(base), Path::new("/tmp/da/audit.jsonl"));
    }

    #[test]
    #[cfg(unix)]
    fn private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested/data");
        create_private_dir(&target).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
