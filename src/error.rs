use std::fmt;

use tokio_tungstenite::tungstenite;

/// Failures inside the gateway receive/send path. None of these reach the
/// caller of `GatewayClient`; they are logged and the message is skipped.
#[derive(Debug)]
pub enum GatewayError {
    Json(serde_json::Error),
    Compression(std::io::Error),
    Socket(tungstenite::Error),
    UnexpectedFrame,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Json(e) => write!(f, "malformed envelope: {e}"),
            GatewayError::Compression(e) => write!(f, "zlib error: {e}"),
            GatewayError::Socket(e) => write!(f, "socket error: {e}"),
            GatewayError::UnexpectedFrame => write!(f, "unexpected frame type"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Json(e)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Compression(e)
    }
}

impl From<tungstenite::Error> for GatewayError {
    fn from(e: tungstenite::Error) -> Self {
        GatewayError::Socket(e)
    }
}

/// Step of the access-key handshake that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    ReadSeed,
    Derive,
    WriteKey,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStep::ReadSeed => write!(f, "read seed"),
            HandshakeStep::Derive => write!(f, "derive key"),
            HandshakeStep::WriteKey => write!(f, "write key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    Link(String),
    NotAuthenticated,
    HandshakeFailed { step: HandshakeStep, reason: String },
    Decode(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Link(msg) => write!(f, "device link error: {msg}"),
            DeviceError::NotAuthenticated => write!(f, "device session is not authenticated"),
            DeviceError::HandshakeFailed { step, reason } => {
                write!(f, "handshake failed at {step}: {reason}")
            }
            DeviceError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl DeviceError {
    pub(crate) fn in_handshake(self, step: HandshakeStep) -> Self {
        match self {
            e @ DeviceError::HandshakeFailed { .. } => e,
            other => DeviceError::HandshakeFailed {
                step,
                reason: other.to_string(),
            },
        }
    }
}
