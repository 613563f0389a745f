use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clinic_core::ClinicCore;
use clinic_server::config::ServerConfig;
use clinic_server::{app, AppState};

const DEFAULT_FILTER: &str = "clinic_server=info,clinic_core=info,tower_http=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let production = std::env::var("CLINIC_ENV")
        .map(|env| env.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    if production {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ServerConfig::parse();
    init_tracing();

    let clinic_config = config.clinic_config();
    std::fs::create_dir_all(&clinic_config.upload_root).with_context(|| {
        format!(
            "creating upload directory {}",
            clinic_config.upload_root.display()
        )
    })?;

    let core = ClinicCore::open(&config.database, clinic_config)
        .with_context(|| format!("opening database {}", config.database.display()))?;
    let router = app(AppState::new(core));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "Clinic server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Clinic server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
