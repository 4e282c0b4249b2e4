use modbridge_core::{CodecError, ErrorKind, HandshakeError, RemoteError};

/// Errors surfaced to callers of the bridge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Handshake failed; the session never started.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection broke or a frame could not be carried.
    #[error("transport error: {0}")]
    Transport(String),
    /// The peer answered with an error. Displays as the peer's text.
    #[error(transparent)]
    Relay(#[from] RemoteError),
    /// A result did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// A lifecycle call arrived out of order.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The module's init failed. Carries the module's error, kind included.
    #[error("module init failed: {0}")]
    Init(RemoteError),
}

impl BridgeError {
    pub(crate) fn closed() -> Self {
        BridgeError::Transport("connection closed".to_string())
    }
}

impl From<HandshakeError> for BridgeError {
    fn from(e: HandshakeError) -> Self {
        BridgeError::Protocol(e.to_string())
    }
}

impl From<CodecError> for BridgeError {
    fn from(e: CodecError) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

/// How a local failure is reported to the peer.
impl From<BridgeError> for RemoteError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Relay(remote) => remote,
            BridgeError::ProtocolViolation(message) => RemoteError::protocol_violation(message),
            BridgeError::Decode(message) => RemoteError::invalid(message),
            BridgeError::Init(remote) => remote,
            other => RemoteError::new(ErrorKind::Internal, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_keeps_text_and_kind() {
        let e = BridgeError::Relay(RemoteError::not_found("not found"));
        assert_eq!(e.to_string(), "not found");
        assert_eq!(RemoteError::from(e), RemoteError::not_found("not found"));
    }

    #[test]
    fn violation_crosses_as_its_own_kind() {
        let remote = RemoteError::from(BridgeError::ProtocolViolation("enable before init".into()));
        assert_eq!(remote.kind, ErrorKind::ProtocolViolation);
        assert_eq!(remote.message, "enable before init");
    }

    #[test]
    fn init_failure_keeps_its_kind() {
        let remote = RemoteError::from(BridgeError::Init(RemoteError::invalid("bad settings")));
        assert_eq!(remote, RemoteError::invalid("bad settings"));
    }

    #[test]
    fn transport_failures_become_internal() {
        let remote = RemoteError::from(BridgeError::closed());
        assert_eq!(remote.kind, ErrorKind::Internal);
        assert_eq!(remote.message, "transport error: connection closed");
    }
}
