//! Core types for probing operations.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Payload carried by every echo request this crate sends.
pub const DEFAULT_PAYLOAD: &[u8] = b"NETPROBE-ECHO";

/// IP address family a probe runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

impl AddressFamily {
    /// Family of the given address.
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Returns true if `addr` belongs to this family.
    pub fn matches(self, addr: IpAddr) -> bool {
        Self::of(addr) == self
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "v4"),
            AddressFamily::V6 => write!(f, "v6"),
        }
    }
}

impl std::str::FromStr for AddressFamily {
    type Err = crate::ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "v4" | "ipv4" | "4" => Ok(AddressFamily::V4),
            "v6" | "ipv6" | "6" => Ok(AddressFamily::V6),
            _ => Err(crate::ProbeError::InvalidParams(format!(
                "unknown address family: {}",
                s
            ))),
        }
    }
}

/// A probe target: the name the caller supplied and the address it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Hostname or literal address as given.
    pub input: String,
    /// Resolved address.
    pub address: IpAddr,
}

impl Target {
    pub fn new(input: impl Into<String>, address: IpAddr) -> Self {
        Self {
            input: input.into(),
            address,
        }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.address)
    }
}

/// Classification of a single attempted probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStatus {
    Ok,
    Timeout,
    SendError,
    ParseError,
    UnexpectedReply,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProbeStatus::Ok => "ok",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::SendError => "send-error",
            ProbeStatus::ParseError => "parse-error",
            ProbeStatus::UnexpectedReply => "unexpected-reply",
        };
        f.write_str(s)
    }
}

/// Kind of ICMP message a responder sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyKind {
    EchoReply,
    TimeExceeded,
    DestinationUnreachable,
}

impl std::fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReplyKind::EchoReply => "echo-reply",
            ReplyKind::TimeExceeded => "time-exceeded",
            ReplyKind::DestinationUnreachable => "destination-unreachable",
        };
        f.write_str(s)
    }
}

/// Parameters for an echo run.
#[derive(Debug, Clone)]
pub struct EchoParams {
    /// Number of echo requests to send.
    pub count: u16,
    /// How long to wait for each reply.
    pub timeout: Duration,
    /// Pause between one probe completing and the next being sent.
    pub interval: Duration,
    /// Address family to resolve and probe over.
    pub family: AddressFamily,
    /// Opaque bytes carried in each request.
    pub payload: Vec<u8>,
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            count: 4,
            timeout: Duration::from_millis(2000),
            interval: Duration::from_millis(1000),
            family: AddressFamily::V4,
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }
}

impl EchoParams {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), crate::ProbeError> {
        if self.timeout.is_zero() {
            return Err(crate::ProbeError::InvalidParams(
                "per-probe timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for a hop trace.
#[derive(Debug, Clone)]
pub struct TraceParams {
    /// Highest TTL / hop limit to probe.
    pub max_hops: u8,
    /// How long to wait at each hop.
    pub hop_timeout: Duration,
    /// Address family to resolve and probe over.
    pub family: AddressFamily,
    /// Whether to look up hostnames for responders.
    pub reverse_dns: bool,
    /// Opaque bytes carried in each request.
    pub payload: Vec<u8>,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            max_hops: 30,
            hop_timeout: Duration::from_millis(2000),
            family: AddressFamily::V4,
            reverse_dns: true,
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }
}

impl TraceParams {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), crate::ProbeError> {
        if self.hop_timeout.is_zero() {
            return Err(crate::ProbeError::InvalidParams(
                "per-hop timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
