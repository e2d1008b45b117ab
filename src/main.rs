//! CA Console - Self-hosted Two-Tier Certificate Authority
//!
//! Loads `config.toml` (or the file named by `CA_CONSOLE_CONFIG`), applies
//! `CA_CONSOLE_*` environment overrides, opens the encrypted record store and
//! serves the HTTP API until Ctrl-C.
//!
//! ```bash
//! RUST_LOG=ca_console=debug ./target/release/ca-console
//! ```

use anyhow::{Context, Result};
use ca_console::cert_store::CertStore;
use ca_console::command::ProcessRunner;
use ca_console::configs::AppConfig;
use ca_console::issuer::Issuer;
use ca_console::step::StepCli;
use ca_console::storage::RedbStore;
use ca_console::webserver::{self, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let kv = RedbStore::open(&config.storage.path).context(format!(
        "Failed to open record store at {}",
        config.storage.path.display()
    ))?;
    info!(path = %kv.path().display(), "record store opened");

    let store = Arc::new(CertStore::new(
        Arc::new(kv),
        Arc::new(config.password_material()),
    ));
    let runner = ProcessRunner::new(config.tool_timeout());
    let timeout_secs = runner.timeout().as_secs();
    let step = StepCli::new(Arc::new(runner), config.tool.command_bin.clone());
    info!(command_bin = step.command_bin(), timeout_secs, "certificate tool configured");

    let issuer = Arc::new(Issuer::new(store, step, config.ca_password_defaults()));
    let state = AppState {
        issuer,
        recovery_file: config.server.recovery_file.clone(),
    };

    webserver::serve(state, &config.server).await?;
    info!("server stopped");
    Ok(())
}
