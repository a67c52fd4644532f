//! Error types for probing operations.

use crate::AddressFamily;
use thiserror::Error;

/// Failure to decode bytes into an ICMP message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Unrecognized ICMP{family} type {icmp_type} code {code}")]
    Unrecognized {
        family: AddressFamily,
        icmp_type: u8,
        code: u8,
    },

    #[error("Checksum mismatch: header carries {carried:#06x}, computed {computed:#06x}")]
    BadChecksum { carried: u16, computed: u16 },
}

impl DecodeError {
    /// Returns true if the bytes were damaged rather than merely of a kind we
    /// do not handle.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::TooShort { .. } | Self::BadChecksum { .. })
    }
}

/// Failure to encode an ICMP message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Buffer of {0} bytes is too small for an ICMP echo header")]
    BufferTooSmall(usize),
}

/// Main error type for probing operations.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to resolve {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("Insufficient privileges to open a raw ICMP socket: {0}")]
    Permission(#[source] std::io::Error),

    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("Read timeout exceeded")]
    Timeout,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ProbeError::Timeout,
            std::io::ErrorKind::PermissionDenied => ProbeError::Permission(err),
            _ => ProbeError::Internal(err.to_string()),
        }
    }
}
