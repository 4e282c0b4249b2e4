//! The generic call surface.
//!
//! [`RelayClient`] sends `Call` envelopes and returns the opaque result;
//! [`RelayServer`] receives them and hands each one to a [`CallHandler`].

use crate::BridgeError;
use crate::session::{Dispatch, RpcClient};
use modbridge_core::{Args, Method, RemoteError, Request, Response, Rpc};
use std::future::Future;
use std::sync::Arc;

/// Anything that can carry a generic call to a peer.
pub trait Invoke: Send + Sync {
    fn invoke(&self, request: Request) -> impl Future<Output = Result<Vec<u8>, BridgeError>> + Send;
}

impl<I: Invoke> Invoke for Arc<I> {
    fn invoke(&self, request: Request) -> impl Future<Output = Result<Vec<u8>, BridgeError>> + Send {
        (**self).invoke(request)
    }
}

impl<I: Invoke> Invoke for &I {
    fn invoke(&self, request: Request) -> impl Future<Output = Result<Vec<u8>, BridgeError>> + Send {
        (**self).invoke(request)
    }
}

/// Client side of the generic call surface.
///
/// Holds nothing but the session handle; clones share it and may call
/// concurrently.
#[derive(Clone)]
pub struct RelayClient {
    rpc: RpcClient,
}

impl RelayClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// One round trip: `method path?args` with an opaque body.
    pub async fn call(
        &self,
        method: Method,
        path: impl Into<String>,
        args: &Args,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, BridgeError> {
        let request = Request::new(method, path)
            .with_args(args.clone())
            .with_body(body);
        self.invoke(request).await
    }
}

impl Invoke for RelayClient {
    async fn invoke(&self, request: Request) -> Result<Vec<u8>, BridgeError> {
        tracing::debug!(method = %request.method, path = %request.path, "Relaying call");
        self.rpc.request(Rpc::Call(request)).await
    }
}

/// The single entry point a peer implements to serve generic calls.
pub trait CallHandler: Send + Sync + 'static {
    fn call(&self, request: Request) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;
}

/// Server side of the generic call surface.
///
/// Lifecycle calls are refused here: this is what the host offers a module
/// through the broker, and only modules have a lifecycle.
pub struct RelayServer<H> {
    handler: Arc<H>,
}

impl<H: CallHandler> RelayServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: CallHandler> Dispatch for RelayServer<H> {
    async fn dispatch(&self, rpc: Rpc) -> Response {
        match rpc {
            Rpc::Call(request) => {
                tracing::debug!(method = %request.method, path = %request.path, "Serving call");
                self.handler.call(request).await.into()
            }
            other => Response::Err(RemoteError::unsupported(format!(
                "{} is not served on this connection",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{handshake_client, handshake_server, serve};
    use crate::transport::Connection;
    use modbridge_core::{ErrorKind, HANDSHAKE};

    struct Table;

    impl CallHandler for Table {
        async fn call(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
            match (request.method, request.path.as_str()) {
                (Method::Get, "/api/networks/abc-123") => {
                    Ok(br#"{"uuid":"abc-123","name":"net1"}"#.to_vec())
                }
                (Method::Post, "/echo") => {
                    let mut out = request.args.encode().unwrap().into_bytes();
                    out.extend(request.body);
                    Ok(out)
                }
                _ => Err(RemoteError::not_found("not found")),
            }
        }
    }

    async fn relay() -> RelayClient {
        let (mut client, mut server) = Connection::pair();
        tokio::spawn(async move {
            handshake_server(&mut server, &HANDSHAKE).await.unwrap();
            serve(server, Arc::new(RelayServer::new(Arc::new(Table)))).await;
        });
        handshake_client(&mut client, &HANDSHAKE).await.unwrap();
        RelayClient::new(RpcClient::new(client))
    }

    #[tokio::test]
    async fn call_returns_opaque_result() {
        let relay = relay().await;
        let result = relay
            .call(Method::Get, "/api/networks/abc-123", &Args::new(), Vec::new())
            .await
            .unwrap();
        assert_eq!(result, br#"{"uuid":"abc-123","name":"net1"}"#);
    }

    #[tokio::test]
    async fn args_and_body_reach_the_handler() {
        let relay = relay().await;
        let args = Args::new().with("k", "v");
        let result = relay
            .call(Method::Post, "/echo", &args, vec![0, 0, 1])
            .await
            .unwrap();
        let mut expected = args.encode().unwrap().into_bytes();
        expected.extend([0, 0, 1]);
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn handler_error_text_is_verbatim() {
        let relay = relay().await;
        let err = relay
            .call(Method::Get, "/api/networks/missing", &Args::new(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not found");
        assert!(matches!(err, BridgeError::Relay(ref e) if e.kind == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn lifecycle_calls_are_unsupported() {
        let server = RelayServer::new(Arc::new(Table));
        let response = server.dispatch(Rpc::Enable).await;
        assert!(matches!(
            response,
            Response::Err(RemoteError { kind: ErrorKind::Unsupported, .. })
        ));
    }
}
