//! Starting module processes and connecting to them.

use crate::config::{HostConfig, ModuleConfig};
use modbridge_core::{HANDSHAKE, HandshakeError, HandshakeLine};
use modbridge_rpc::{BridgeError, ModuleClient, WsTransport};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("module exited before printing its handshake")]
    Exited,
    #[error("no handshake within {0}s")]
    Timeout(u64),
    #[error("bad handshake: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("unsupported transport {network}/{protocol}")]
    Unsupported { network: String, protocol: String },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// A running module process and the connection to it.
///
/// Dropping this kills the process.
pub struct LaunchedModule {
    pub name: String,
    pub client: ModuleClient<WsTransport>,
    pub handshake: HandshakeLine,
    child: Child,
}

impl LaunchedModule {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn kill(mut self) -> Result<(), LaunchError> {
        self.child.kill().await?;
        Ok(())
    }
}

/// Spawn `module`, wait for its handshake line and connect to it.
pub async fn launch(module: &ModuleConfig, host: &HostConfig) -> Result<LaunchedModule, LaunchError> {
    let mut child = Command::new(&module.path)
        .args(&module.args)
        .env(HANDSHAKE.magic_cookie_key, HANDSHAKE.magic_cookie_value)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            path: module.path.clone(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("module stdout not captured"))?;
    let mut lines = BufReader::new(stdout).lines();

    let handshake = tokio::time::timeout(host.handshake_timeout(), read_handshake(&mut lines))
        .await
        .map_err(|_| LaunchError::Timeout(host.handshake_timeout_secs))??;
    HANDSHAKE.check_version(handshake.app_version)?;
    if handshake.network != "tcp" || handshake.protocol != "ws" {
        return Err(LaunchError::Unsupported {
            network: handshake.network,
            protocol: handshake.protocol,
        });
    }
    tracing::info!(module = %module.name, address = %handshake.address, "Module listening");

    // Anything printed after the handshake is logged instead of blocking the pipe.
    let name = module.name.clone();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(module = %name, "{}", line);
        }
    });

    let connect = ModuleClient::connect(WsTransport, &handshake.address, host.broker_bind.clone());
    let client = tokio::time::timeout(host.handshake_timeout(), connect)
        .await
        .map_err(|_| LaunchError::Timeout(host.handshake_timeout_secs))??;
    Ok(LaunchedModule {
        name: module.name.clone(),
        client,
        handshake,
        child,
    })
}

/// Read lines until the handshake line. Blank lines are skipped.
pub async fn read_handshake<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
) -> Result<HandshakeLine, LaunchError> {
    loop {
        match lines.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(line.parse()?),
            None => return Err(LaunchError::Exited),
        }
    }
}
