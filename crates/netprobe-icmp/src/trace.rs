//! Hop tracing: TTL escalation towards one target.

use crate::matcher::{Outstanding, Verdict};
use crate::packet::{encode, EchoMessage};
use crate::process_identifier;
use netprobe_core::{
    AddressResolver, Hop, ProbeError, ProbeSession, ReplyKind, SessionFactory, Target,
    TerminalReason, TraceParams, TraceReport,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Discovers the path to a target by sending one echo request per TTL,
/// starting at 1, until the target itself answers or the hop limit runs out.
#[derive(Clone)]
pub struct HopTracer {
    sessions: Arc<dyn SessionFactory>,
    resolver: Arc<dyn AddressResolver>,
    params: TraceParams,
    identifier: u16,
}

impl HopTracer {
    /// Creates a tracer. Fails if `params` do not validate.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        resolver: Arc<dyn AddressResolver>,
        params: TraceParams,
    ) -> Result<Self, ProbeError> {
        params.validate()?;
        Ok(Self {
            sessions,
            resolver,
            params,
            identifier: process_identifier(),
        })
    }

    /// Overrides the echo identifier (defaults to the process identifier).
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Traces the path to `target`.
    pub async fn run(&self, target: &str) -> TraceReport {
        let address = match self.resolver.resolve(target, self.params.family).await {
            Ok(address) => address,
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to resolve target");
                return TraceReport::resolve_failed(target, e);
            }
        };
        let target = Target::new(target, address);

        info!(
            target = %target.input,
            ip = %address,
            max_hops = self.params.max_hops,
            "Starting hop trace"
        );

        let mut hops = Vec::new();
        for ttl in 1..=self.params.max_hops {
            // A fresh session per TTL so the hop limit is fixed at open time
            let mut session = match self.sessions.open(self.params.family, Some(ttl)).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(target = %target.input, ttl, error = %e, "Failed to open probe session");
                    return TraceReport {
                        target: target.input,
                        ip: Some(address),
                        hops,
                        terminal: TerminalReason::SessionFailed,
                        error: Some(e.to_string()),
                    };
                }
            };

            let mut hop = self.probe_hop(session.as_mut(), &target, ttl).await;
            if let Err(e) = session.close().await {
                debug!(ttl, error = %e, "Failed to close probe session");
            }
            drop(session);

            if self.params.reverse_dns {
                if let Some(responder) = hop.responder {
                    hop.hostname = self.resolver.reverse_lookup(responder).await;
                }
            }

            debug!(
                ttl,
                responder = ?hop.responder,
                kind = ?hop.kind,
                rtt_ms = hop.elapsed.as_secs_f64() * 1000.0,
                "Hop finished"
            );

            let reached = hop.is_destination();
            hops.push(hop);
            if reached {
                info!(target = %target.input, hops = hops.len(), "Reached destination");
                return TraceReport {
                    target: target.input,
                    ip: Some(address),
                    hops,
                    terminal: TerminalReason::DestinationReached,
                    error: None,
                };
            }
        }

        info!(target = %target.input, hops = hops.len(), "Hop limit exhausted");
        TraceReport {
            target: target.input,
            ip: Some(address),
            hops,
            terminal: TerminalReason::HopLimitExhausted,
            error: None,
        }
    }

    async fn probe_hop(&self, session: &mut dyn ProbeSession, target: &Target, ttl: u8) -> Hop {
        let family = self.params.family;
        let seq = u16::from(ttl);
        let message = EchoMessage::request(self.identifier, seq, &self.params.payload);
        let packet = match encode(&message, family) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(ttl, error = %e, "Failed to encode echo request");
                return Hop::silent(ttl, Duration::ZERO);
            }
        };

        let start = Instant::now();
        trace!(ttl, identifier = self.identifier, "Sending echo request");
        if let Err(e) = session.send(&packet, target.address).await {
            warn!(target = %target.input, ttl, error = %e, "Failed to send echo request");
            return Hop::silent(ttl, start.elapsed());
        }

        let deadline = start + self.params.hop_timeout;
        let outstanding = Outstanding {
            target: target.address,
            identifier: self.identifier,
            sequence: seq,
        };

        loop {
            match session.receive(deadline).await {
                Ok((source, bytes)) => match outstanding.classify(source, &bytes, family) {
                    Verdict::EchoReply => {
                        return answered(ttl, source, start.elapsed(), ReplyKind::EchoReply)
                    }
                    Verdict::Related(kind) => return answered(ttl, source, start.elapsed(), kind),
                    Verdict::Malformed(e) => {
                        debug!(ttl, error = %e, "Ignored malformed reply");
                        continue;
                    }
                    Verdict::Foreign => {
                        trace!(ttl, source = %source, "Ignored foreign ICMP traffic");
                        continue;
                    }
                },
                Err(ProbeError::Timeout) => return Hop::silent(ttl, start.elapsed()),
                Err(e) => {
                    debug!(ttl, error = %e, "Receive failed, treating as timeout");
                    return Hop::silent(ttl, start.elapsed());
                }
            }
        }
    }
}

fn answered(ttl: u8, responder: IpAddr, elapsed: Duration, kind: ReplyKind) -> Hop {
    Hop {
        ttl,
        responder: Some(responder),
        hostname: None,
        elapsed,
        success: true,
        kind: Some(kind),
    }
}
