//! Call relays and the module bridge.
//!
//! - [`transport`]: framed byte connections (websocket or in-memory)
//! - [`session`]: handshake and request/reply multiplexing over a connection
//! - [`relay`]: the generic call surface, client and server side
//! - [`broker`]: callback connections offered by the host, dialed by modules
//! - [`facade`]: typed capability helpers over any relay
//! - [`module`]: the module-side lifecycle controller and serve loop
//! - [`host`]: the host's handle on a running module

pub mod broker;
mod error;
pub mod facade;
pub mod host;
pub mod module;
pub mod relay;
pub mod session;
pub mod transport;

pub use broker::Broker;
pub use error::BridgeError;
pub use facade::Marshaller;
pub use host::ModuleClient;
pub use module::{BridgeState, Module, ModuleServer, serve_listener, serve_module};
pub use relay::{CallHandler, Invoke, RelayClient, RelayServer};
pub use session::{Dispatch, RpcClient};
pub use transport::{Connection, Listener, MemoryTransport, Transport, WsTransport};
