//! Report types returned to callers.
//!
//! Durations serialize as floating point milliseconds so the JSON output
//! reads the same way the text output does.

use crate::{ProbeStatus, ReplyKind};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of one attempted probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Sequence number the probe was sent with.
    pub seq: u16,
    /// Time from send to classification.
    #[serde(rename = "rtt_ms", with = "duration_ms")]
    pub elapsed: Duration,
    /// How the probe was classified.
    pub status: ProbeStatus,
}

/// Aggregate for one target's echo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostReport {
    /// Target as supplied by the caller.
    pub target: String,
    /// Resolved address, if resolution succeeded.
    pub ip: Option<IpAddr>,
    /// Number of probes attempted.
    pub transmitted: u32,
    /// Number of probes answered with a matching echo reply.
    pub received: u32,
    /// Packet loss percentage.
    pub loss_percent: f64,
    #[serde(rename = "rtt_min_ms", with = "duration_ms")]
    pub rtt_min: Duration,
    #[serde(rename = "rtt_avg_ms", with = "duration_ms")]
    pub rtt_avg: Duration,
    #[serde(rename = "rtt_max_ms", with = "duration_ms")]
    pub rtt_max: Duration,
    /// Per probe outcomes in sequence order.
    pub per_packet: Vec<ProbeOutcome>,
    /// Setup failure that prevented the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostReport {
    /// Report for a target whose run never started.
    pub fn failed(target: impl Into<String>, ip: Option<IpAddr>, error: impl ToString) -> Self {
        Self {
            target: target.into(),
            ip,
            transmitted: 0,
            received: 0,
            loss_percent: 0.0,
            rtt_min: Duration::ZERO,
            rtt_avg: Duration::ZERO,
            rtt_max: Duration::ZERO,
            per_packet: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// A single hop in a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    /// The TTL / hop limit the probe was sent with.
    pub ttl: u8,
    /// The address that responded (None if no response).
    pub responder: Option<IpAddr>,
    /// Reverse DNS name of the responder, best effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Time from send to reply or timeout.
    #[serde(rename = "rtt_ms", with = "duration_ms")]
    pub elapsed: Duration,
    /// Whether anything answered at this hop.
    pub success: bool,
    /// ICMP message kind the responder sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReplyKind>,
}

impl Hop {
    /// A hop at which nothing answered.
    pub fn silent(ttl: u8, elapsed: Duration) -> Self {
        Self {
            ttl,
            responder: None,
            hostname: None,
            elapsed,
            success: false,
            kind: None,
        }
    }

    /// Returns true if the destination itself answered at this hop.
    pub fn is_destination(&self) -> bool {
        self.kind == Some(ReplyKind::EchoReply)
    }
}

/// Why a trace stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    DestinationReached,
    HopLimitExhausted,
    ResolveFailed,
    /// A raw socket could not be opened for the next hop.
    SessionFailed,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalReason::DestinationReached => "destination-reached",
            TerminalReason::HopLimitExhausted => "hop-limit-exhausted",
            TerminalReason::ResolveFailed => "resolve-failed",
            TerminalReason::SessionFailed => "session-failed",
        };
        f.write_str(s)
    }
}

/// Result of tracing the path to one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    /// Target as supplied by the caller.
    pub target: String,
    /// Resolved address, if resolution succeeded.
    pub ip: Option<IpAddr>,
    /// Hops in TTL order.
    pub hops: Vec<Hop>,
    /// Why the trace stopped.
    pub terminal: TerminalReason,
    /// Setup failure that ended the trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceReport {
    /// Report for a target that could not be resolved.
    pub fn resolve_failed(target: impl Into<String>, error: impl ToString) -> Self {
        Self {
            target: target.into(),
            ip: None,
            hops: Vec::new(),
            terminal: TerminalReason::ResolveFailed,
            error: Some(error.to_string()),
        }
    }
}

/// Serde adapter storing a `Duration` as fractional milliseconds.
pub mod duration_ms {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(D::Error::custom(format!("invalid duration: {} ms", ms)));
        }
        Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }
}

/// Serializes any report collection to indented JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
