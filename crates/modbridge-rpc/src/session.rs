//! Handshake and request/reply multiplexing over one [`Connection`].
//!
//! The connecting side runs [`handshake_client`] and then wraps the connection
//! in an [`RpcClient`]; the accepting side runs [`handshake_server`] and then
//! [`serve`]s it with a [`Dispatch`] implementation.

use crate::BridgeError;
use crate::transport::{Connection, FrameReceiver, FrameSender};
use modbridge_core::{CallId, Frame, HandshakeConfig, RemoteError, Response, Rpc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, oneshot};

/// Server-side handler for incoming calls.
///
/// Every call is dispatched on its own task, so implementations may be
/// invoked concurrently.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, rpc: Rpc) -> impl Future<Output = Response> + Send;
}

async fn recv_frame(conn: &mut Connection) -> Result<Frame, BridgeError> {
    let bytes = conn.recv().await.ok_or_else(BridgeError::closed)?;
    Ok(Frame::decode(&bytes)?)
}

async fn send_frame(conn: &Connection, frame: &Frame) -> Result<(), BridgeError> {
    conn.send(frame.encode()?).await
}

/// Open a session: send our hello and wait for the verdict.
pub async fn handshake_client(
    conn: &mut Connection,
    config: &HandshakeConfig,
) -> Result<(), BridgeError> {
    send_frame(conn, &Frame::Hello(config.hello())).await?;
    match recv_frame(conn).await? {
        Frame::Welcome => Ok(()),
        Frame::Reject { message } => Err(BridgeError::Protocol(message)),
        other => Err(BridgeError::Protocol(format!(
            "unexpected {} frame during handshake",
            other.kind()
        ))),
    }
}

/// Accept a session: the first frame must be a hello matching `config`.
pub async fn handshake_server(
    conn: &mut Connection,
    config: &HandshakeConfig,
) -> Result<(), BridgeError> {
    let verdict = match recv_frame(conn).await? {
        Frame::Hello(hello) => config.verify(&hello).map_err(|e| e.to_string()),
        other => Err(format!("expected hello, got {} frame", other.kind())),
    };
    match verdict {
        Ok(()) => send_frame(conn, &Frame::Welcome).await,
        Err(message) => {
            tracing::warn!("Rejecting session: {}", message);
            send_frame(conn, &Frame::Reject { message: message.clone() }).await?;
            Err(BridgeError::Protocol(message))
        }
    }
}

#[derive(Default)]
struct Pending {
    calls: HashMap<CallId, oneshot::Sender<Response>>,
    closed: bool,
}

/// Caller side of a session.
///
/// Clones share the connection. Each call gets its own id and waits only for
/// its own reply, so any number of calls can be in flight at once.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    tx: FrameSender,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Wrap a connection that has completed [`handshake_client`].
    pub fn new(conn: Connection) -> Self {
        let (tx, rx) = conn.split();
        let pending = Arc::new(Mutex::new(Pending::default()));
        tokio::spawn(reader_loop(rx, pending.clone()));
        Self {
            inner: Arc::new(ClientInner {
                tx,
                pending,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Make one call and wait for its reply.
    ///
    /// An error reply becomes [`BridgeError::Relay`]; a lost connection
    /// becomes [`BridgeError::Transport`]. Nothing is retried.
    pub async fn request(&self, rpc: Rpc) -> Result<Vec<u8>, BridgeError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Request { id, rpc }.encode()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            if pending.closed {
                return Err(BridgeError::closed());
            }
            pending.calls.insert(id, reply_tx);
        }
        if let Err(e) = self.inner.tx.send(frame).await {
            self.inner.pending.lock().await.calls.remove(&id);
            return Err(e);
        }
        let response = reply_rx.await.map_err(|_| BridgeError::closed())?;
        Ok(response.into_result()?)
    }
}

async fn reader_loop(mut rx: FrameReceiver, pending: Arc<Mutex<Pending>>) {
    while let Some(bytes) = rx.recv().await {
        match Frame::decode(&bytes) {
            Ok(Frame::Reply { id, response }) => {
                let waiter = pending.lock().await.calls.remove(&id);
                match waiter {
                    // The caller may have gone away; nothing to do then.
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::warn!("Reply for unknown call {}", id),
                }
            }
            Ok(other) => tracing::warn!("Unexpected {} frame on client session", other.kind()),
            Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
        }
    }
    let mut pending = pending.lock().await;
    pending.closed = true;
    if !pending.calls.is_empty() {
        tracing::debug!("Connection closed with {} calls in flight", pending.calls.len());
    }
    pending.calls.clear();
}

/// Serve calls arriving on an accepted connection until the peer goes away.
pub async fn serve<D: Dispatch>(conn: Connection, dispatch: Arc<D>) {
    let (tx, mut rx) = conn.split();
    while let Some(bytes) = rx.recv().await {
        let (id, rpc) = match Frame::decode(&bytes) {
            Ok(Frame::Request { id, rpc }) => (id, rpc),
            Ok(other) => {
                tracing::warn!("Unexpected {} frame on server session", other.kind());
                continue;
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                continue;
            }
        };
        let tx = tx.clone();
        let dispatch = dispatch.clone();
        tokio::spawn(async move {
            let response = dispatch_guarded(dispatch, rpc).await;
            match (Frame::Reply { id, response }).encode() {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        tracing::debug!("Peer left before reply {} was sent", id);
                    }
                }
                Err(e) => tracing::warn!("Failed to encode reply {}: {}", id, e),
            }
        });
    }
    tracing::debug!("Session closed by peer");
}

/// Run one call on its own task so a panicking handler only fails that call.
async fn dispatch_guarded<D: Dispatch>(dispatch: Arc<D>, rpc: Rpc) -> Response {
    let op = rpc.name();
    tracing::debug!(op, "Dispatching call");
    match tokio::spawn(async move { dispatch.dispatch(rpc).await }).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(op, "Handler failed: {}", e);
            Response::Err(RemoteError::internal(format!("{op} handler failed")))
        }
    }
}
