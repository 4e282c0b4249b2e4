//! Module side of the bridge.
//!
//! A module implements [`Module`] and calls [`serve_module`] from `main`. The
//! [`ModuleServer`] in between sequences the lifecycle: nothing but
//! `get_info` and `validate_and_set_config` is accepted until `init` has
//! dialed back into the host and the module's own init has succeeded.

use crate::BridgeError;
use crate::broker::Broker;
use crate::relay::RelayClient;
use crate::session::{Dispatch, handshake_server, serve};
use crate::transport::{Listener, Transport};
use modbridge_core::{DialToken, HANDSHAKE, HandshakeLine, ModuleInfo, RemoteError, Request, Response, Rpc};
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};

/// What a module implements.
///
/// Errors are returned as [`RemoteError`] and reach the host with their kind
/// and text intact. Calls may arrive concurrently.
pub trait Module: Send + Sync + 'static {
    /// Called once, after the bridge back to the host is up. `host` reaches
    /// the host's data service; keep a clone of it.
    fn init(
        &self,
        host: RelayClient,
        module_name: String,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn enable(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn disable(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Validate and apply an opaque config, returning the effective config.
    fn validate_and_set_config(
        &self,
        config: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;

    fn info(&self) -> ModuleInfo;

    /// Uniform entry point for generic calls from the host.
    fn call(&self, request: Request) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Started, no callback connection yet.
    Unbridged,
    /// Initialized with a live callback connection into the host.
    Bridged,
}

/// Lifecycle controller wrapping a [`Module`].
pub struct ModuleServer<M, T> {
    module: M,
    broker: Broker<T>,
    // Kept for the life of the process once set.
    host: OnceCell<RelayClient>,
    // Held for the whole of an init so overlapping inits run one at a time.
    init_lock: Mutex<()>,
}

impl<M: Module, T: Transport> ModuleServer<M, T> {
    pub fn new(module: M, broker: Broker<T>) -> Self {
        Self {
            module,
            broker,
            host: OnceCell::new(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn state(&self) -> BridgeState {
        if self.host.initialized() {
            BridgeState::Bridged
        } else {
            BridgeState::Unbridged
        }
    }

    /// Relay into the host, once bridged.
    pub fn host(&self) -> Option<&RelayClient> {
        self.host.get()
    }

    /// Dial the host's callback service, then run the module's init.
    ///
    /// Only the first successful call bridges; later calls are violations.
    pub async fn initialize(
        &self,
        dial_token: DialToken,
        module_name: String,
    ) -> Result<(), BridgeError> {
        let _guard = self.init_lock.lock().await;
        let already = || {
            BridgeError::ProtocolViolation(format!("{module_name} is already initialized"))
        };
        if self.host.initialized() {
            return Err(already());
        }
        let rpc = self
            .broker
            .dial(&dial_token)
            .await
            .map_err(|e| BridgeError::Init(e.into()))?;
        let host = RelayClient::new(rpc);
        self.module
            .init(host.clone(), module_name.clone())
            .await
            .map_err(BridgeError::Init)?;
        self.host.set(host).map_err(|_| already())?;
        tracing::info!(module = %module_name, "Module initialized");
        Ok(())
    }

    pub async fn enable(&self) -> Result<(), BridgeError> {
        self.require_bridged("enable")?;
        self.module.enable().await?;
        tracing::info!("Module enabled");
        Ok(())
    }

    pub async fn disable(&self) -> Result<(), BridgeError> {
        self.require_bridged("disable")?;
        self.module.disable().await?;
        tracing::info!("Module disabled");
        Ok(())
    }

    pub async fn validate_and_set_config(&self, config: Vec<u8>) -> Result<Vec<u8>, BridgeError> {
        Ok(self.module.validate_and_set_config(config).await?)
    }

    pub fn get_info(&self) -> ModuleInfo {
        self.module.info()
    }

    pub async fn call(&self, request: Request) -> Result<Vec<u8>, BridgeError> {
        self.require_bridged("call")?;
        Ok(self.module.call(request).await?)
    }

    fn require_bridged(&self, op: &str) -> Result<(), BridgeError> {
        match self.state() {
            BridgeState::Bridged => Ok(()),
            BridgeState::Unbridged => Err(BridgeError::ProtocolViolation(format!(
                "{op} called before init"
            ))),
        }
    }
}

impl<M: Module, T: Transport> Dispatch for ModuleServer<M, T> {
    async fn dispatch(&self, rpc: Rpc) -> Response {
        let result = match rpc {
            Rpc::Init {
                dial_token,
                module_name,
            } => self.initialize(dial_token, module_name).await.map(|()| Vec::new()),
            Rpc::Enable => self.enable().await.map(|()| Vec::new()),
            Rpc::Disable => self.disable().await.map(|()| Vec::new()),
            Rpc::ValidateAndSetConfig { config } => self.validate_and_set_config(config).await,
            Rpc::GetInfo => serde_json::to_vec(&self.get_info())
                .map_err(|e| BridgeError::Transport(e.to_string())),
            Rpc::Call(request) => self.call(request).await,
        };
        result.map_err(RemoteError::from).into()
    }
}

/// Entry point for a module binary.
///
/// Refuses to run unless launched by a host, listens on `bind_addr`, prints
/// the handshake line on stdout and serves the host until it disconnects.
/// Log output must not go to stdout.
pub async fn serve_module<M: Module, T: Transport>(
    module: M,
    transport: T,
    bind_addr: &str,
) -> Result<(), BridgeError> {
    let cookie = std::env::var(HANDSHAKE.magic_cookie_key).ok();
    serve_with_cookie(module, transport, bind_addr, cookie.as_deref()).await
}

async fn serve_with_cookie<M: Module, T: Transport>(
    module: M,
    transport: T,
    bind_addr: &str,
    cookie: Option<&str>,
) -> Result<(), BridgeError> {
    HANDSHAKE.check_cookie(cookie)?;

    let listener = transport.listen(bind_addr).await?;
    let line = HandshakeLine::websocket(HANDSHAKE.protocol_version, listener.local_addr());
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| BridgeError::Transport(e.to_string()))?;
    stdout
        .flush()
        .await
        .map_err(|e| BridgeError::Transport(e.to_string()))?;

    serve_listener(module, transport, listener, bind_addr).await
}

/// Accept the host's connection on `listener` and serve it.
///
/// Callback connections are offered by the host and dialed through a broker
/// over the same `transport`.
pub async fn serve_listener<M: Module, T: Transport>(
    module: M,
    transport: T,
    mut listener: T::Listener,
    broker_bind: &str,
) -> Result<(), BridgeError> {
    tracing::info!("Waiting for host on {}", listener.local_addr());
    let mut conn = listener.accept().await?;
    drop(listener);
    handshake_server(&mut conn, &HANDSHAKE).await?;

    let server = Arc::new(ModuleServer::new(module, Broker::new(transport, broker_bind)));
    serve(conn, server).await;
    tracing::info!("Host disconnected");
    Ok(())
}
