//! Echo probing: a bounded run of echo requests against one target.

use crate::matcher::{Outstanding, Verdict};
use crate::packet::{encode, EchoMessage};
use crate::process_identifier;
use netprobe_core::{
    stats, AddressResolver, EchoParams, HostReport, ProbeError, ProbeOutcome, ProbeSession,
    ProbeStatus, SessionFactory, Target,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Sends `count` echo requests to a target, one at a time, and reports
/// loss and round-trip statistics.
#[derive(Clone)]
pub struct EchoProber {
    sessions: Arc<dyn SessionFactory>,
    resolver: Arc<dyn AddressResolver>,
    params: EchoParams,
    identifier: u16,
}

impl EchoProber {
    /// Creates a prober. Fails if `params` do not validate.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        resolver: Arc<dyn AddressResolver>,
        params: EchoParams,
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

    /// Runs the echo sequence against `target`.
    ///
    /// Setup failures (resolution, socket permissions) produce a report with
    /// nothing transmitted and the error recorded; they never panic or
    /// propagate.
    pub async fn run(&self, target: &str) -> HostReport {
        let address = match self.resolver.resolve(target, self.params.family).await {
            Ok(address) => address,
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to resolve target");
                return HostReport::failed(target, None, e);
            }
        };
        let target = Target::new(target, address);

        let mut session = match self.sessions.open(self.params.family, None).await {
            Ok(session) => session,
            Err(e) => {
                warn!(target = %target.input, error = %e, "Failed to open probe session");
                return HostReport::failed(&target.input, Some(address), e);
            }
        };

        info!(
            target = %target.input,
            ip = %address,
            count = self.params.count,
            "Starting echo probes"
        );

        let outcomes = self.probe_all(session.as_mut(), &target).await;
        if let Err(e) = session.close().await {
            debug!(error = %e, "Failed to close probe session");
        }

        let report = stats::summarize(&target.input, Some(address), outcomes);
        info!(
            target = %report.target,
            transmitted = report.transmitted,
            received = report.received,
            loss_percent = report.loss_percent,
            "Echo probes finished"
        );
        report
    }

    async fn probe_all(
        &self,
        session: &mut dyn ProbeSession,
        target: &Target,
    ) -> Vec<ProbeOutcome> {
        let count = self.params.count;
        let mut outcomes = Vec::with_capacity(usize::from(count));

        for seq in 1..=count {
            let outcome = self.probe_once(session, target, seq).await;
            debug!(
                seq = outcome.seq,
                status = %outcome.status,
                rtt_ms = outcome.elapsed.as_secs_f64() * 1000.0,
                "Probe finished"
            );

            // A failed send never waited, so it does not earn a pause either.
            let pause = outcome.status != ProbeStatus::SendError && seq < count;
            outcomes.push(outcome);
            if pause {
                tokio::time::sleep(self.params.interval).await;
            }
        }

        outcomes
    }

    async fn probe_once(
        &self,
        session: &mut dyn ProbeSession,
        target: &Target,
        seq: u16,
    ) -> ProbeOutcome {
        let family = self.params.family;
        let message = EchoMessage::request(self.identifier, seq, &self.params.payload);
        let packet = match encode(&message, family) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(seq, error = %e, "Failed to encode echo request");
                return ProbeOutcome {
                    seq,
                    elapsed: Duration::ZERO,
                    status: ProbeStatus::SendError,
                };
            }
        };

        let start = Instant::now();
        trace!(seq, identifier = self.identifier, "Sending echo request");
        if let Err(e) = session.send(&packet, target.address).await {
            warn!(target = %target.input, seq, error = %e, "Failed to send echo request");
            return ProbeOutcome {
                seq,
                elapsed: start.elapsed(),
                status: ProbeStatus::SendError,
            };
        }

        let deadline = start + self.params.timeout;
        let outstanding = Outstanding {
            target: target.address,
            identifier: self.identifier,
            sequence: seq,
        };

        let status = loop {
            match session.receive(deadline).await {
                Ok((source, bytes)) => match outstanding.classify(source, &bytes, family) {
                    Verdict::EchoReply => break ProbeStatus::Ok,
                    Verdict::Related(kind) => {
                        debug!(
                            seq,
                            source = %source,
                            kind = %kind,
                            "ICMP error instead of echo reply"
                        );
                        break ProbeStatus::UnexpectedReply;
                    }
                    Verdict::Malformed(e) => {
                        debug!(seq, error = %e, "Malformed reply from target");
                        break ProbeStatus::ParseError;
                    }
                    Verdict::Foreign => {
                        trace!(seq, source = %source, "Ignored foreign ICMP traffic");
                        continue;
                    }
                },
                Err(ProbeError::Timeout) => break ProbeStatus::Timeout,
                Err(e) => {
                    debug!(seq, error = %e, "Receive failed, treating as timeout");
                    break ProbeStatus::Timeout;
                }
            }
        };

        ProbeOutcome {
            seq,
            elapsed: start.elapsed(),
            status,
        }
    }
}
