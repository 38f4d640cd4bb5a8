//! Diagnostics: build info, uptime and log rotation helpers.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Uptime**: seconds since [`mark_started`]
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// File name prefix of the daily log files.
pub const LOG_FILE_PREFIX: &str = "crm";

static APP_START_EPOCH: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub git_sha: &'static str,
    pub platform: &'static str,
    pub arch: &'static str,
    pub rust_version: &'static str,
}

/// Returns version, build timestamp, git SHA, and platform info.
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        git_sha: env!("BUILD_GIT_SHA"),
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        rust_version: env!("CARGO_PKG_RUST_VERSION"),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Record process start time for uptime tracking.
pub fn mark_started() {
    APP_START_EPOCH.store(epoch_secs(), Ordering::Relaxed);
}

pub fn uptime_secs() -> u64 {
    match APP_START_EPOCH.load(Ordering::Relaxed) {
        0 => 0,
        start => epoch_secs().saturating_sub(start),
    }
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Log directory inside the data directory.
pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
