//! Core configuration.

use std::path::PathBuf;

use chrono::Duration;

/// Default upload limit per X-ray file.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

/// Settings for [`crate::ClinicCore`].
#[derive(Debug, Clone)]
pub struct ClinicConfig {
    /// Directory holding per-doctor X-ray folders
    pub upload_root: PathBuf,
    pub max_upload_bytes: u64,
    /// Lower-case extensions accepted for X-ray uploads
    pub allowed_extensions: Vec<String>,
    pub session_ttl: Duration,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ["jpg", "jpeg", "png"].iter().map(|s| s.to_string()).collect(),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }
}

impl ClinicConfig {
    pub fn with_upload_root(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            ..Self::default()
        }
    }
}
