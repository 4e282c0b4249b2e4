//! modbridge host daemon.
//!
//! Launches every configured module, bridges it to the in-memory data
//! service and keeps it running until Ctrl-C.
//!
//! Usage:
//!   modbridge-host --config modbridge.toml

use anyhow::Context;
use clap::Parser;
use modbridge_host::{HostConfig, LaunchedModule, MemoryStore, ModuleConfig, launch};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modbridge-host", about = "Run modbridge modules")]
struct Cli {
    /// Path to the host config file.
    #[arg(long, env = "MODBRIDGE_CONFIG", default_value = "modbridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("modbridge_host=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = HostConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let store = Arc::new(MemoryStore::from_config(&config).context("seeding data service")?);
    tracing::info!(
        "Loaded {} module(s) from {}",
        config.modules.len(),
        cli.config.display()
    );

    let mut running = Vec::new();
    for module in &config.modules {
        if !module.enabled {
            tracing::info!(module = %module.name, "Skipping disabled module");
            continue;
        }
        match start(module, &config, store.clone()).await {
            Ok(launched) => running.push(launched),
            Err(e) => tracing::warn!(module = %module.name, "Failed to start module: {:#}", e),
        }
    }
    if running.is_empty() {
        tracing::warn!("No modules running");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for launched in running {
        if let Err(e) = launched.client.disable().await {
            tracing::warn!(module = %launched.name, "Disable failed: {}", e);
        }
        if let Err(e) = launched.kill().await {
            tracing::debug!("Kill failed: {}", e);
        }
    }
    Ok(())
}

/// Launch, initialize, configure and enable one module.
async fn start(
    module: &ModuleConfig,
    config: &HostConfig,
    store: Arc<MemoryStore>,
) -> anyhow::Result<LaunchedModule> {
    let launched = launch(module, config).await?;
    let client = &launched.client;

    client.init(&module.name, store).await?;

    let info = client.info().await?;
    tracing::info!(
        module = %module.name,
        author = %info.author,
        license = %info.license,
        has_network = info.has_network,
        "Module info"
    );

    if let Some(json) = module.config_json()? {
        let effective = client.validate_and_set_config(json).await?;
        tracing::info!(
            module = %module.name,
            "Config accepted: {}",
            String::from_utf8_lossy(&effective)
        );
    }

    client.enable().await?;
    tracing::info!(module = %module.name, pid = ?launched.id(), "Module enabled");
    Ok(launched)
}
