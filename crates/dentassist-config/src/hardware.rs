// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hardware profile detection.
//!
//! Computed once at startup and advisory only: the scheduler consults it for
//! its generate-worker default and the runtime for layer-offload defaults.
//! The probe never fails -- anything it cannot classify is `cpu_only`.

use std::path::Path;
use std::str::FromStr;

use dentassist_core::HardwareProfile;

/// Environment override for the detected profile.
pub const HW_PROFILE_ENV: &str = "DENTASSIST_HW_PROFILE";

/// VRAM threshold separating the high and low profiles, in MiB.
const HIGH_VRAM_MIB: u64 = 8 * 1024;

/// Detect the hardware profile.
///
/// Order: explicit override env var, NVIDIA accelerator probe via the
/// kernel's procfs surface, else `cpu_only`.
pub fn detect_profile() -> HardwareProfile {
    if let Ok(value) = std::env::var(HW_PROFILE_ENV) {
        if let Ok(profile) = HardwareProfile::from_str(value.trim()) {
            tracing::info!(profile = %profile, "hardware profile forced via {HW_PROFILE_ENV}");
            return profile;
        }
        tracing::warn!(value = value.as_str(), "unrecognised {HW_PROFILE_ENV}, probing instead");
    }

    let profile = probe_nvidia(Path::new("/proc/driver/nvidia/gpus"));
    tracing::info!(profile = %profile, "hardware profile detected");
    profile
}

/// Classify based on the NVIDIA procfs directory, if present.
fn probe_nvidia(gpus_dir: &Path) -> HardwareProfile {
    let Ok(entries) = std::fs::read_dir(gpus_dir) else {
        return HardwareProfile::CpuOnly;
    };

    let mut best: Option<HardwareProfile> = None;
    for entry in entries.flatten() {
        let info = entry.path().join("information");
        let profile = match std::fs::read_to_string(&info) {
            Ok(text) => classify_gpu_information(&text),
            // GPU present but VRAM unreadable: assume the conservative tier.
            Err(_) => HardwareProfile::LowVram,
        };
        best = Some(match (best, profile) {
            (Some(HardwareProfile::HighVram), _) | (_, HardwareProfile::HighVram) => {
                HardwareProfile::HighVram
            }
            _ => profile,
        });
    }
    best.unwrap_or(HardwareProfile::CpuOnly)
}

/// Parse the `Video Memory` line of a GPU information file.
fn classify_gpu_information(text: &str) -> HardwareProfile {
    for line in text.lines() {
        let Some(rest) = line.strip_prefix("Video Memory:") else {
            continue;
        };
        let mib = rest
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<u64>().ok());
        return match mib {
            Some(mib) if mib >= HIGH_VRAM_MIB => HardwareProfile::HighVram,
            Some(_) => HardwareProfile::LowVram,
            None => HardwareProfile::LowVram,
        };
    }
    HardwareProfile::LowVram
}
