//! Demo modbridge module.
//!
//! Serves `GET /api/networks/{uuid}` by asking the host, and `GET /api/status`
//! with its own state. Accepts `{"watch_networks": [...]}` as config and logs
//! the watched networks when enabled.
//!
//! Not meant to be run by hand; list it under `[[modules]]` in the host's
//! config and start `modbridge-host`.

mod module;

use modbridge_rpc::{WsTransport, serve_module};
use module::NetworkModule;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the handshake line.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("network_module=info".parse()?))
        .init();

    serve_module(NetworkModule::new(), WsTransport, "127.0.0.1:0").await?;
    Ok(())
}
