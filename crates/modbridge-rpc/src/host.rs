//! Host side of the bridge: a handle on one running module.

use crate::BridgeError;
use crate::broker::Broker;
use crate::relay::{CallHandler, Invoke, RelayServer};
use crate::session::{RpcClient, handshake_client};
use crate::transport::Transport;
use modbridge_core::{ErrorKind, HANDSHAKE, ModuleInfo, Request, Rpc};
use std::sync::Arc;

/// Lifecycle and generic calls into a module.
///
/// Also an [`Invoke`] relay, so a [`Marshaller`](crate::Marshaller) can sit
/// on top of it.
#[derive(Clone)]
pub struct ModuleClient<T> {
    rpc: RpcClient,
    broker: Broker<T>,
}

impl<T: Transport> ModuleClient<T> {
    /// Connect to a module listening on `addr`. Callback services for the
    /// module are offered on `broker_bind`.
    pub async fn connect(
        transport: T,
        addr: &str,
        broker_bind: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let mut conn = transport.connect(addr).await?;
        handshake_client(&mut conn, &HANDSHAKE).await?;
        tracing::debug!("Connected to module at {}", addr);
        Ok(Self {
            rpc: RpcClient::new(conn),
            broker: Broker::new(transport, broker_bind),
        })
    }

    /// Offer `service` as the module's callback into the host, then tell the
    /// module to initialize with it.
    pub async fn init<H: CallHandler>(
        &self,
        module_name: &str,
        service: Arc<H>,
    ) -> Result<(), BridgeError> {
        let dial_token = self
            .broker
            .offer(Arc::new(RelayServer::new(service)))
            .await?;
        self.rpc
            .request(Rpc::Init {
                dial_token,
                module_name: module_name.to_string(),
            })
            .await
            .map_err(|e| match lift_violation(e) {
                BridgeError::Relay(remote) => BridgeError::Init(remote),
                other => other,
            })?;
        tracing::info!(module = module_name, "Module initialized");
        Ok(())
    }

    pub async fn enable(&self) -> Result<(), BridgeError> {
        self.lifecycle(Rpc::Enable).await.map(|_| ())
    }

    pub async fn disable(&self) -> Result<(), BridgeError> {
        self.lifecycle(Rpc::Disable).await.map(|_| ())
    }

    pub async fn validate_and_set_config(&self, config: Vec<u8>) -> Result<Vec<u8>, BridgeError> {
        self.lifecycle(Rpc::ValidateAndSetConfig { config }).await
    }

    pub async fn info(&self) -> Result<ModuleInfo, BridgeError> {
        let bytes = self.lifecycle(Rpc::GetInfo).await?;
        serde_json::from_slice(&bytes).map_err(|e| BridgeError::Decode(e.to_string()))
    }

    async fn lifecycle(&self, rpc: Rpc) -> Result<Vec<u8>, BridgeError> {
        self.rpc.request(rpc).await.map_err(lift_violation)
    }
}

impl<T: Transport> Invoke for ModuleClient<T> {
    async fn invoke(&self, request: Request) -> Result<Vec<u8>, BridgeError> {
        tracing::debug!(method = %request.method, path = %request.path, "Calling module");
        self.rpc
            .request(Rpc::Call(request))
            .await
            .map_err(lift_violation)
    }
}

/// A violation reported by the module is a violation here too.
fn lift_violation(e: BridgeError) -> BridgeError {
    match e {
        BridgeError::Relay(remote) if remote.kind == ErrorKind::ProtocolViolation => {
            BridgeError::ProtocolViolation(remote.message)
        }
        other => other,
    }
}
