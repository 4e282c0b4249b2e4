//! Core types for modbridge.
//!
//! This crate provides the protocol primitives shared by hosts and modules:
//! the generic call envelope, its codec, the handshake constants and the
//! typed operations layered on top of the envelope. It does no I/O.

mod args;
mod envelope;
mod error;
mod handshake;
mod message;
mod method;
pub mod model;
mod route;

pub use args::Args;
pub use envelope::{Request, Response, decode_request, decode_response, encode_request, encode_response};
pub use error::{CodecError, ErrorKind, RemoteError};
pub use handshake::{CORE_PROTOCOL_VERSION, HANDSHAKE, HandshakeConfig, HandshakeError, HandshakeLine, Hello};
pub use message::{CallId, DialToken, Frame, Rpc};
pub use method::{Method, UnknownMethod};
pub use route::{Operation, Resource};

use serde::{Deserialize, Serialize};

/// Static descriptor a module reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module name, unique per host.
    pub name: String,
    pub author: String,
    pub website: String,
    pub license: String,
    /// Whether the module owns networks (and so devices and points).
    pub has_network: bool,
}
