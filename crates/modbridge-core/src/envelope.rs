//! The generic call envelope and its codec.
//!
//! A request is `{method, path, args, body}`; a response carries either an
//! opaque result or a [`RemoteError`]. Bodies and results are never inspected
//! here: their format is a convention between caller and callee.

use crate::{Args, CodecError, Method, RemoteError};
use serde::{Deserialize, Serialize};

/// A generic remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub method: Method,
    /// Logical resource or action, e.g. `/api/networks/abc-123`.
    pub path: String,
    #[serde(default, with = "crate::args::as_string")]
    pub args: Args,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            args: Args::new(),
            body: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Outcome of a remote call.
///
/// The two cases are exclusive by construction. On the wire this is
/// `{result, error}`; if `error` is present the call failed and `result` is
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireResponse", into = "WireResponse")]
pub enum Response {
    Ok(Vec<u8>),
    Err(RemoteError),
}

impl Response {
    /// A successful response with no payload.
    pub fn ack() -> Self {
        Response::Ok(Vec::new())
    }

    pub fn into_result(self) -> Result<Vec<u8>, RemoteError> {
        match self {
            Response::Ok(result) => Ok(result),
            Response::Err(e) => Err(e),
        }
    }
}

impl From<Result<Vec<u8>, RemoteError>> for Response {
    fn from(result: Result<Vec<u8>, RemoteError>) -> Self {
        match result {
            Ok(bytes) => Response::Ok(bytes),
            Err(e) => Response::Err(e),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    result: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RemoteError>,
}

impl From<WireResponse> for Response {
    fn from(wire: WireResponse) -> Self {
        match wire.error {
            Some(e) => Response::Err(e),
            None => Response::Ok(wire.result),
        }
    }
}

impl From<Response> for WireResponse {
    fn from(response: Response) -> Self {
        match response {
            Response::Ok(result) => WireResponse {
                result,
                error: None,
            },
            Response::Err(e) => WireResponse {
                result: Vec::new(),
                error: Some(e),
            },
        }
    }
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(request).map_err(|e| CodecError::Envelope(e.to_string()))
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Envelope(e.to_string()))
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(response).map_err(|e| CodecError::Envelope(e.to_string()))
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Envelope(e.to_string()))
}
