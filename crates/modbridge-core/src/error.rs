//! Errors that are encoded on the wire or raised by the codec.

use serde::{Deserialize, Serialize};

/// Coarse classification of an error that crossed the process boundary.
///
/// Unknown kinds sent by a newer peer decode as `Internal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Unsupported,
    ProtocolViolation,
    #[default]
    #[serde(other)]
    Internal,
}

/// An error reported by the peer.
///
/// Displays as the bare message, so the text a module reports is the text the
/// host sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    #[serde(default)]
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Failure to encode or decode a protocol value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed argument set: {0}")]
    Args(String),
    #[error("malformed envelope: {0}")]
    Envelope(String),
    #[error("malformed frame: {0}")]
    Frame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_bare_message() {
        assert_eq!(RemoteError::not_found("not found").to_string(), "not found");
    }

    #[test]
    fn unknown_kind_decodes_as_internal() {
        let e: RemoteError =
            serde_json::from_str(r#"{"kind":"rate_limited","message":"slow down"}"#).unwrap();
        assert_eq!(e, RemoteError::internal("slow down"));
    }

    #[test]
    fn missing_kind_decodes_as_internal() {
        let e: RemoteError = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        assert_eq!(e.kind, ErrorKind::Internal);
    }
}
