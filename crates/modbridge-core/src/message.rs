//! Protocol frames.
//!
//! Every connection carries the same frame type in both directions. The
//! connecting side opens with [`Frame::Hello`]; afterwards each
//! [`Frame::Request`] is answered by exactly one [`Frame::Reply`] with the same
//! id, in whatever order the callee finishes them.

use crate::{CodecError, Hello, Request, Response};
use serde::{Deserialize, Serialize};

/// Correlates a reply with its request on one connection.
pub type CallId = u64;

/// Opaque token naming a connection the host offers through its broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialToken(String);

impl DialToken {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Transport address to dial.
    pub fn address(&self) -> &str {
        &self.0
    }
}

/// A call a peer can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Rpc {
    /// Bridge back to the host and initialize the module.
    Init {
        dial_token: DialToken,
        module_name: String,
    },
    Enable,
    Disable,
    ValidateAndSetConfig {
        #[serde(default)]
        config: Vec<u8>,
    },
    GetInfo,
    /// Generic verb/path call.
    Call(Request),
}

impl Rpc {
    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Rpc::Init { .. } => "init",
            Rpc::Enable => "enable",
            Rpc::Disable => "disable",
            Rpc::ValidateAndSetConfig { .. } => "validate_and_set_config",
            Rpc::GetInfo => "get_info",
            Rpc::Call(_) => "call",
        }
    }
}

/// Messages exchanged over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Hello(Hello),
    /// Handshake accepted.
    Welcome,
    /// Handshake refused; the connection is closed after this frame.
    Reject { message: String },
    Request { id: CallId, rpc: Rpc },
    Reply { id: CallId, response: Response },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "hello",
            Frame::Welcome => "welcome",
            Frame::Reject { .. } => "reject",
            Frame::Request { .. } => "request",
            Frame::Reply { .. } => "reply",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Frame(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Frame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Args, HANDSHAKE, Method, RemoteError};

    #[test]
    fn request_frame_shape() {
        let frame = Frame::Request {
            id: 7,
            rpc: Rpc::Call(
                Request::new(Method::Get, "/api/networks/abc-123")
                    .with_args(Args::new().with("with_devices", "true")),
            ),
        };
        let json: serde_json::Value = serde_json::from_slice(&frame.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["id"], 7);
        assert_eq!(json["rpc"]["op"], "call");
        assert_eq!(json["rpc"]["method"], "GET");
        assert_eq!(json["rpc"]["args"], r#"{"with_devices":["true"]}"#);
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn lifecycle_frames_roundtrip() {
        for rpc in [
            Rpc::Init {
                dial_token: DialToken::new("127.0.0.1:9000"),
                module_name: "modbus".into(),
            },
            Rpc::Enable,
            Rpc::Disable,
            Rpc::ValidateAndSetConfig {
                config: b"{}".to_vec(),
            },
            Rpc::GetInfo,
        ] {
            let frame = Frame::Request { id: 1, rpc };
            assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
        }
    }

    #[test]
    fn reply_and_handshake_frames() {
        let reply = Frame::Reply {
            id: 3,
            response: Response::Err(RemoteError::not_found("not found")),
        };
        assert_eq!(Frame::decode(&reply.encode().unwrap()).unwrap(), reply);

        let hello = Frame::Hello(HANDSHAKE.hello());
        let json: serde_json::Value = serde_json::from_slice(&hello.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "hello");
        assert_eq!(json["cookie_key"], "BASIC_PLUGIN");
    }

    #[test]
    fn unknown_frame_type_fails() {
        assert!(Frame::decode(br#"{"type":"stream"}"#).is_err());
    }
}
