//! Reduction of per-probe outcomes into a host report.

use crate::{HostReport, ProbeOutcome, ProbeStatus};
use std::net::IpAddr;
use std::time::Duration;

/// Round-trip statistics over the answered probes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RttSummary {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
}

/// Computes min/avg/max over `ok` outcomes. All zero when none succeeded.
pub fn rtt_summary(outcomes: &[ProbeOutcome]) -> RttSummary {
    let rtts: Vec<Duration> = outcomes
        .iter()
        .filter(|o| o.status == ProbeStatus::Ok)
        .map(|o| o.elapsed)
        .collect();

    let (Some(min), Some(max)) = (rtts.iter().min(), rtts.iter().max()) else {
        return RttSummary::default();
    };

    let total: Duration = rtts.iter().sum();
    RttSummary {
        min: *min,
        avg: total / rtts.len() as u32,
        max: *max,
    }
}

/// Loss percentage; zero when nothing was transmitted.
pub fn loss_percent(transmitted: u32, received: u32) -> f64 {
    if transmitted == 0 {
        return 0.0;
    }
    f64::from(transmitted.saturating_sub(received)) / f64::from(transmitted) * 100.0
}

/// Builds the final report for one target from its ordered outcomes.
pub fn summarize(target: &str, ip: Option<IpAddr>, outcomes: Vec<ProbeOutcome>) -> HostReport {
    let transmitted = outcomes.len() as u32;
    let received = outcomes
        .iter()
        .filter(|o| o.status == ProbeStatus::Ok)
        .count() as u32;
    let rtt = rtt_summary(&outcomes);

    HostReport {
        target: target.to_string(),
        ip,
        transmitted,
        received,
        loss_percent: loss_percent(transmitted, received),
        rtt_min: rtt.min,
        rtt_avg: rtt.avg,
        rtt_max: rtt.max,
        per_packet: outcomes,
        error: None,
    }
}
