//! CLI for netprobe.

mod render;
mod runner;

use clap::{Parser, Subcommand};
use netprobe_core::{
    to_json, AddressFamily, AddressResolver, EchoParams, SessionFactory, TraceParams,
    DEFAULT_PAYLOAD,
};
use netprobe_icmp::RawSessionFactory;
use runner::SystemResolver;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// ICMP echo probing and hop tracing.
#[derive(Parser, Debug)]
#[command(name = "netprobe")]
#[command(version)]
#[command(about = "ICMP echo probing and hop tracing")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Probe over IPv6.
    #[arg(short = '6', long, global = true)]
    pub ipv6: bool,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send echo requests and report loss and round-trip times.
    Ping(PingArgs),
    /// Discover the hops on the path to each host.
    Traceroute(TraceArgs),
}

#[derive(clap::Args, Debug)]
pub struct PingArgs {
    /// Target hostnames or IP addresses.
    #[arg(required = true)]
    pub hosts: Vec<String>,

    /// Number of echo requests per host.
    #[arg(short, long, default_value = "4")]
    pub count: u16,

    /// Timeout per probe in milliseconds.
    #[arg(short = 'W', long, default_value = "2000")]
    pub timeout: u64,

    /// Pause between probes in milliseconds.
    #[arg(short, long, default_value = "1000")]
    pub interval: u64,
}

#[derive(clap::Args, Debug)]
pub struct TraceArgs {
    /// Target hostnames or IP addresses.
    #[arg(required = true)]
    pub hosts: Vec<String>,

    /// Maximum TTL.
    #[arg(
        short,
        long = "max-hops",
        default_value = "30",
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    pub max_hops: u8,

    /// Timeout per hop in milliseconds.
    #[arg(short = 'W', long, default_value = "2000")]
    pub timeout: u64,

    /// Skip reverse DNS lookups of responders.
    #[arg(long = "no-reverse-dns")]
    pub no_reverse_dns: bool,
}

impl Args {
    fn family(&self) -> AddressFamily {
        if self.ipv6 {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }

    fn echo_params(&self, ping: &PingArgs) -> EchoParams {
        EchoParams {
            count: ping.count,
            timeout: Duration::from_millis(ping.timeout),
            interval: Duration::from_millis(ping.interval),
            family: self.family(),
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }

    fn trace_params(&self, trace: &TraceArgs) -> TraceParams {
        TraceParams {
            max_hops: trace.max_hops,
            hop_timeout: Duration::from_millis(trace.timeout),
            family: self.family(),
            reverse_dns: !trace.no_reverse_dns,
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let sessions: Arc<dyn SessionFactory> = Arc::new(RawSessionFactory);
    let resolver: Arc<dyn AddressResolver> = Arc::new(SystemResolver::from_system_conf());

    match &args.command {
        Command::Ping(ping) => {
            let params = args.echo_params(ping);
            tracing::info!(hosts = ping.hosts.len(), count = params.count, "Starting ping");

            let result = runner::run_ping(ping.hosts.clone(), params, sessions, resolver).await;
            let reports = match result {
                Ok(reports) => reports,
                Err(e) => {
                    eprintln!("Ping failed: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            if args.json {
                match to_json(&reports) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize results: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                let text: Vec<String> = reports.iter().map(render::ping_text).collect();
                print!("{}", text.join("\n"));
            }

            // Like ping(8): success only if every host answered at least once
            if reports.iter().all(|r| r.error.is_none() && r.received > 0) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Traceroute(trace) => {
            let params = args.trace_params(trace);
            let max_hops = params.max_hops;
            tracing::info!(hosts = trace.hosts.len(), max_hops, "Starting traceroute");

            let result =
                runner::run_traceroute(trace.hosts.clone(), params, sessions, resolver).await;
            let reports = match result {
                Ok(reports) => reports,
                Err(e) => {
                    eprintln!("Traceroute failed: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            if args.json {
                match to_json(&reports) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize results: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                let text: Vec<String> = reports
                    .iter()
                    .map(|r| render::trace_text(r, max_hops))
                    .collect();
                print!("{}", text.join("\n"));
            }

            if reports.iter().all(|r| r.error.is_none()) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
