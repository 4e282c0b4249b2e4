//! Handshake constants and checks.
//!
//! A module process only runs when launched by a host: the host sets the
//! magic cookie in the module's environment, the module announces where it
//! listens with a single [`HandshakeLine`] on stdout, and the first frame on
//! every connection is a [`Hello`] that must match [`HANDSHAKE`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the process-level handshake line format.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// The handshake both endpoints are compiled with.
pub const HANDSHAKE: HandshakeConfig = HandshakeConfig {
    protocol_version: 1,
    magic_cookie_key: "BASIC_PLUGIN",
    magic_cookie_value: "hello",
};

/// Protocol version plus a shared key/value pair.
///
/// The cookie is not a secret; it only stops a module binary from being run
/// by hand or by an unrelated host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: &'static str,
    pub magic_cookie_value: &'static str,
}

impl HandshakeConfig {
    /// The in-band hello frame announcing this configuration.
    pub fn hello(&self) -> Hello {
        Hello {
            protocol_version: self.protocol_version,
            cookie_key: self.magic_cookie_key.to_string(),
            cookie_value: self.magic_cookie_value.to_string(),
        }
    }

    /// Check a peer's hello against this configuration.
    pub fn verify(&self, hello: &Hello) -> Result<(), HandshakeError> {
        self.check_version(hello.protocol_version)?;
        if hello.cookie_key != self.magic_cookie_key
            || hello.cookie_value != self.magic_cookie_value
        {
            return Err(HandshakeError::CookieMismatch {
                key: self.magic_cookie_key.to_string(),
            });
        }
        Ok(())
    }

    pub fn check_version(&self, version: u32) -> Result<(), HandshakeError> {
        if version != self.protocol_version {
            return Err(HandshakeError::VersionMismatch {
                expected: self.protocol_version,
                actual: version,
            });
        }
        Ok(())
    }

    /// Check the cookie value found in a module's environment.
    pub fn check_cookie(&self, value: Option<&str>) -> Result<(), HandshakeError> {
        match value {
            Some(v) if v == self.magic_cookie_value => Ok(()),
            _ => Err(HandshakeError::NotLaunchedByHost {
                key: self.magic_cookie_key.to_string(),
            }),
        }
    }
}

/// First frame sent by the connecting side of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub protocol_version: u32,
    pub cookie_key: String,
    pub cookie_value: String,
}

/// The line a module prints on stdout once it is listening.
///
/// Format: `CORE|APP|NETWORK|ADDRESS|PROTOCOL`, e.g. `1|1|tcp|127.0.0.1:40123|ws`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub app_version: u32,
    pub network: String,
    pub address: String,
    pub protocol: String,
}

impl HandshakeLine {
    /// A websocket-over-tcp announcement for `address`.
    pub fn websocket(app_version: u32, address: impl Into<String>) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
            network: "tcp".to_string(),
            address: address.into(),
            protocol: "ws".to_string(),
        }
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.protocol
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HandshakeError::MalformedLine(s.to_string());
        let parts: Vec<&str> = s.trim().split('|').collect();
        let [core, app, network, address, protocol] = parts.as_slice() else {
            return Err(malformed());
        };
        let core_version: u32 = core.parse().map_err(|_| malformed())?;
        if core_version != CORE_PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch {
                expected: CORE_PROTOCOL_VERSION,
                actual: core_version,
            });
        }
        if address.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            core_version,
            app_version: app.parse().map_err(|_| malformed())?,
            network: network.to_string(),
            address: address.to_string(),
            protocol: protocol.to_string(),
        })
    }
}

/// Handshake failure. Always fatal for the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("incompatible protocol version: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("magic cookie mismatch for {key}")]
    CookieMismatch { key: String },
    #[error(
        "this binary is a modbridge module and is not meant to be run directly; \
         it must be launched by a host ({key} is unset or wrong)"
    )]
    NotLaunchedByHost { key: String },
    #[error("malformed handshake line: {0:?}")]
    MalformedLine(String),
}
