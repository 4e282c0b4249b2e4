//! Callback connections.
//!
//! The host [`offer`](Broker::offer)s a service on a fresh listener and passes
//! the resulting [`DialToken`] to the module inside `Init`. The module
//! [`dial`](Broker::dial)s the token to get its own session back into the
//! host. The two directions never share a connection.

use crate::BridgeError;
use crate::session::{Dispatch, RpcClient, handshake_client, handshake_server, serve};
use crate::transport::{Listener, Transport};
use modbridge_core::{DialToken, HANDSHAKE, HandshakeConfig};
use std::sync::Arc;
use std::time::Duration;

/// How long a connection to an offered service gets to complete its hello.
const DIAL_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Broker<T> {
    transport: T,
    bind_addr: String,
    handshake: &'static HandshakeConfig,
}

impl<T: Transport> Broker<T> {
    /// A broker that offers services on `bind_addr` (usually an ephemeral
    /// address such as `127.0.0.1:0`).
    pub fn new(transport: T, bind_addr: impl Into<String>) -> Self {
        Self {
            transport,
            bind_addr: bind_addr.into(),
            handshake: &HANDSHAKE,
        }
    }

    pub fn with_handshake(mut self, handshake: &'static HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Listen until one connection completes the handshake, then serve
    /// `service` on it.
    ///
    /// Connections that fail or stall the handshake are dropped and the
    /// listener stays open. The accepted connection is served until the
    /// dialing side goes away. A token that is never dialed keeps its listener
    /// for the life of the process.
    pub async fn offer<D: Dispatch>(&self, service: Arc<D>) -> Result<DialToken, BridgeError> {
        let mut listener = self.transport.listen(&self.bind_addr).await?;
        let token = DialToken::new(listener.local_addr());
        let handshake = self.handshake;
        tracing::debug!("Offering callback service at {}", listener.local_addr());

        tokio::spawn(async move {
            let conn = loop {
                let mut conn = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Callback listener failed: {}", e);
                        return;
                    }
                };
                match tokio::time::timeout(
                    DIAL_HANDSHAKE_TIMEOUT,
                    handshake_server(&mut conn, handshake),
                )
                .await
                {
                    Ok(Ok(())) => break conn,
                    Ok(Err(e)) => tracing::warn!("Callback handshake failed: {}", e),
                    Err(_) => tracing::warn!("Callback handshake timed out"),
                }
            };
            drop(listener);
            serve(conn, service).await;
        });

        Ok(token)
    }

    /// Connect to a service the peer offered.
    pub async fn dial(&self, token: &DialToken) -> Result<RpcClient, BridgeError> {
        let mut conn = self.transport.connect(token.address()).await?;
        handshake_client(&mut conn, self.handshake).await?;
        tracing::debug!("Dialed callback service at {}", token.address());
        Ok(RpcClient::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{CallHandler, RelayClient, RelayServer};
    use crate::transport::MemoryTransport;
    use modbridge_core::{Args, Method, RemoteError, Request};

    struct Hostname;

    impl CallHandler for Hostname {
        async fn call(&self, _request: Request) -> Result<Vec<u8>, RemoteError> {
            Ok(b"host-1".to_vec())
        }
    }

    const STALE: HandshakeConfig = HandshakeConfig {
        protocol_version: 0,
        magic_cookie_key: "BASIC_PLUGIN",
        magic_cookie_value: "hello",
    };

    #[tokio::test]
    async fn offered_service_is_reachable_by_token() {
        let broker = Broker::new(MemoryTransport::new(), "");
        let token = broker
            .offer(Arc::new(RelayServer::new(Arc::new(Hostname))))
            .await
            .unwrap();

        let relay = RelayClient::new(broker.dial(&token).await.unwrap());
        let result = relay
            .call(Method::Get, "/hostname", &Args::new(), Vec::new())
            .await
            .unwrap();
        assert_eq!(result, b"host-1");
    }

    #[tokio::test]
    async fn token_serves_one_connection() {
        let broker = Broker::new(MemoryTransport::new(), "");
        let token = broker
            .offer(Arc::new(RelayServer::new(Arc::new(Hostname))))
            .await
            .unwrap();
        let _first = broker.dial(&token).await.unwrap();
        assert!(broker.dial(&token).await.is_err());
    }

    #[tokio::test]
    async fn dial_with_mismatched_handshake_fails() {
        let transport = MemoryTransport::new();
        let host = Broker::new(transport.clone(), "");
        let module = Broker::new(transport, "").with_handshake(&STALE);
        let token = host
            .offer(Arc::new(RelayServer::new(Arc::new(Hostname))))
            .await
            .unwrap();
        assert!(matches!(
            module.dial(&token).await,
            Err(BridgeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn stray_connections_do_not_consume_the_token() {
        let transport = MemoryTransport::new();
        let host = Broker::new(transport.clone(), "");
        let token = host
            .offer(Arc::new(RelayServer::new(Arc::new(Hostname))))
            .await
            .unwrap();

        // A peer that connects and hangs up without a hello.
        drop(transport.connect(token.address()).await.unwrap());
        // A peer with the wrong handshake.
        let stale = Broker::new(transport.clone(), "").with_handshake(&STALE);
        assert!(stale.dial(&token).await.is_err());

        let relay = RelayClient::new(host.dial(&token).await.unwrap());
        let result = relay
            .call(Method::Get, "/hostname", &Args::new(), Vec::new())
            .await
            .unwrap();
        assert_eq!(result, b"host-1");
    }

    #[tokio::test]
    async fn unknown_token_is_a_transport_error() {
        let broker = Broker::new(MemoryTransport::new(), "");
        assert!(matches!(
            broker.dial(&DialToken::new("mem-404")).await,
            Err(BridgeError::Transport(_))
        ));
    }
}
