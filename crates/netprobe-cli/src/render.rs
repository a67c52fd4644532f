//! Text rendering of reports in the style of the classic `ping` and
//! `traceroute` tools.

use netprobe_core::{HostReport, ProbeStatus, TraceReport};
use std::fmt::Write;
use std::time::Duration;

fn ms(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64() * 1000.0)
}

/// Renders one echo report.
pub fn ping_text(report: &HostReport) -> String {
    let mut out = String::new();

    let Some(ip) = report.ip else {
        let error = report.error.as_deref().unwrap_or("unresolved");
        let _ = writeln!(out, "ping: {}: {}", report.target, error);
        return out;
    };

    let _ = writeln!(out, "PING {} ({})", report.target, ip);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "ping: {}", error);
        return out;
    }

    for outcome in &report.per_packet {
        match outcome.status {
            ProbeStatus::Ok => {
                let _ = writeln!(
                    out,
                    "reply from {}: seq={} time={} ms",
                    ip,
                    outcome.seq,
                    ms(outcome.elapsed)
                );
            }
            status => {
                let _ = writeln!(out, "seq={} {}", outcome.seq, status);
            }
        }
    }

    let _ = writeln!(out, "--- {} ping statistics ---", report.target);
    let _ = writeln!(
        out,
        "{} packets transmitted, {} received, {:.1}% packet loss",
        report.transmitted, report.received, report.loss_percent
    );
    if report.received > 0 {
        let _ = writeln!(
            out,
            "rtt min/avg/max = {}/{}/{} ms",
            ms(report.rtt_min),
            ms(report.rtt_avg),
            ms(report.rtt_max)
        );
    }
    out
}

/// Renders one trace report.
pub fn trace_text(report: &TraceReport, max_hops: u8) -> String {
    let mut out = String::new();

    let Some(ip) = report.ip else {
        let error = report.error.as_deref().unwrap_or("unresolved");
        let _ = writeln!(out, "traceroute: {}: {}", report.target, error);
        return out;
    };

    let _ = writeln!(out, "traceroute to {} ({}), {} hops max", report.target, ip, max_hops);
    for hop in &report.hops {
        match hop.responder {
            Some(responder) => {
                let name = hop.hostname.as_deref().unwrap_or("");
                if name.is_empty() {
                    let _ = writeln!(out, "{:>2}  {}  {} ms", hop.ttl, responder, ms(hop.elapsed));
                } else {
                    let _ = writeln!(
                        out,
                        "{:>2}  {} ({})  {} ms",
                        hop.ttl,
                        name,
                        responder,
                        ms(hop.elapsed)
                    );
                }
            }
            None => {
                let _ = writeln!(out, "{:>2}  * * *", hop.ttl);
            }
        }
    }

    match &report.error {
        Some(error) => {
            let _ = writeln!(out, "traceroute: {}: {}", report.terminal, error);
        }
        None => {
            let _ = writeln!(out, "{}", report.terminal);
        }
    }
    out
}
