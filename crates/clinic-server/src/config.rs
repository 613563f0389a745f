//! Server settings from flags and `CLINIC_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use clap::Parser;
use clinic_core::ClinicConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "clinic-server")]
#[command(about = "Clinic records, scheduling and bookkeeping HTTP API")]
pub struct ServerConfig {
    /// Bind address
    #[arg(long, env = "CLINIC_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "CLINIC_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database file
    #[arg(long, env = "CLINIC_DATABASE", default_value = "clinic.db")]
    pub database: PathBuf,

    /// Root directory for X-ray uploads
    #[arg(long, env = "CLINIC_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Per-file upload limit in MiB
    #[arg(long, env = "CLINIC_MAX_UPLOAD_MB", default_value_t = 16)]
    pub max_upload_mb: u64,

    #[arg(long, env = "CLINIC_SESSION_TTL_HOURS", default_value_t = 12)]
    pub session_ttl_hours: i64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn clinic_config(&self) -> ClinicConfig {
        ClinicConfig {
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            session_ttl: Duration::hours(self.session_ttl_hours.max(1)),
            ..ClinicConfig::with_upload_root(&self.upload_dir)
        }
    }
}
