//! Framed byte connections.
//!
//! A [`Transport`] knows how to listen on and connect to addresses; what it
//! hands back is always a [`Connection`], a pair of frame channels. Pump tasks
//! owned by the transport move frames between those channels and the
//! underlying socket, so nothing above this module touches I/O directly.

use crate::BridgeError;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per direction before senders wait.
const FRAME_BUFFER: usize = 64;

/// Opens and accepts connections.
pub trait Transport: Clone + Send + Sync + 'static {
    type Listener: Listener;

    /// Listen on `addr`. The listener reports the address peers should dial.
    fn listen(&self, addr: &str) -> impl Future<Output = Result<Self::Listener, BridgeError>> + Send;

    fn connect(&self, addr: &str) -> impl Future<Output = Result<Connection, BridgeError>> + Send;
}

pub trait Listener: Send + 'static {
    /// Address to hand to peers.
    fn local_addr(&self) -> &str;

    fn accept(&mut self) -> impl Future<Output = Result<Connection, BridgeError>> + Send;
}

/// Sending half of a connection. Cheap to clone; clones share the connection.
#[derive(Debug, Clone)]
pub struct FrameSender(mpsc::Sender<Vec<u8>>);

impl FrameSender {
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), BridgeError> {
        self.0.send(frame).await.map_err(|_| BridgeError::closed())
    }
}

/// Receiving half of a connection.
#[derive(Debug)]
pub struct FrameReceiver(mpsc::Receiver<Vec<u8>>);

impl FrameReceiver {
    /// Next frame, or `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.0.recv().await
    }
}

/// One bidirectional, message-framed connection.
#[derive(Debug)]
pub struct Connection {
    tx: FrameSender,
    rx: FrameReceiver,
}

impl Connection {
    /// Two connected in-memory ends.
    pub fn pair() -> (Connection, Connection) {
        let (a_tx, b_rx) = mpsc::channel(FRAME_BUFFER);
        let (b_tx, a_rx) = mpsc::channel(FRAME_BUFFER);
        (
            Connection {
                tx: FrameSender(a_tx),
                rx: FrameReceiver(a_rx),
            },
            Connection {
                tx: FrameSender(b_tx),
                rx: FrameReceiver(b_rx),
            },
        )
    }

    pub async fn send(&self, frame: Vec<u8>) -> Result<(), BridgeError> {
        self.tx.send(frame).await
    }

    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.tx, self.rx)
    }
}

/// Websocket over TCP, one binary message per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

pub struct WsListener {
    listener: TcpListener,
    local_addr: String,
}

impl Transport for WsTransport {
    type Listener = WsListener;

    async fn listen(&self, addr: &str) -> Result<WsListener, BridgeError> {
        let listener = TcpListener::bind(addr).await.map_err(transport_error)?;
        let local_addr = listener.local_addr().map_err(transport_error)?.to_string();
        tracing::debug!("Listening on ws://{}", local_addr);
        Ok(WsListener {
            listener,
            local_addr,
        })
    }

    async fn connect(&self, addr: &str) -> Result<Connection, BridgeError> {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .map_err(transport_error)?;
        Ok(spawn_pumps(ws))
    }
}

impl Listener for WsListener {
    fn local_addr(&self) -> &str {
        &self.local_addr
    }

    async fn accept(&mut self) -> Result<Connection, BridgeError> {
        let (stream, peer) = self.listener.accept().await.map_err(transport_error)?;
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(transport_error)?;
        tracing::debug!("Accepted connection from {}", peer);
        Ok(spawn_pumps(ws))
    }
}

fn spawn_pumps<S>(ws: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(FRAME_BUFFER);
    let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(FRAME_BUFFER);

    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                tracing::debug!("WebSocket write failed: {}", e);
                return;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let frame = match msg {
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("WebSocket error: {}", e);
                    break;
                }
            };
            if in_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    Connection {
        tx: FrameSender(out_tx),
        rx: FrameReceiver(in_rx),
    }
}

fn transport_error(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Transport(e.to_string())
}

/// In-process transport. Addresses are names in a registry shared by clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, mpsc::Sender<Connection>>,
}

pub struct MemoryListener {
    addr: String,
    incoming: mpsc::Receiver<Connection>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;

    /// An empty address, or one ending in `:0`, picks a fresh name.
    async fn listen(&self, addr: &str) -> Result<MemoryListener, BridgeError> {
        let mut registry = self.registry.lock().await;
        let addr = if addr.is_empty() || addr.ends_with(":0") {
            registry.next_id += 1;
            format!("mem-{}", registry.next_id)
        } else {
            addr.to_string()
        };
        if registry
            .listeners
            .get(&addr)
            .is_some_and(|tx| !tx.is_closed())
        {
            return Err(BridgeError::Transport(format!("address in use: {addr}")));
        }
        let (tx, incoming) = mpsc::channel(FRAME_BUFFER);
        registry.listeners.insert(addr.clone(), tx);
        Ok(MemoryListener { addr, incoming })
    }

    async fn connect(&self, addr: &str) -> Result<Connection, BridgeError> {
        let refused = || BridgeError::Transport(format!("connection refused: {addr}"));
        let tx = self
            .registry
            .lock()
            .await
            .listeners
            .get(addr)
            .cloned()
            .ok_or_else(refused)?;
        let (local, remote) = Connection::pair();
        tx.send(remote).await.map_err(|_| refused())?;
        Ok(local)
    }
}

impl Listener for MemoryListener {
    fn local_addr(&self) -> &str {
        &self.addr
    }

    async fn accept(&mut self) -> Result<Connection, BridgeError> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| BridgeError::Transport("listener closed".to_string()))
    }
}
