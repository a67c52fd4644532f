//! Wires the probers to the system resolver and raw sockets, and fans
//! targets out concurrently.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use netprobe_core::{
    execution::run_all, AddressFamily, AddressResolver, EchoParams, HostReport, ProbeError,
    SessionFactory, TraceParams, TraceReport,
};
use netprobe_icmp::{EchoProber, HopTracer};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves names through the system DNS configuration.
pub struct SystemResolver {
    inner: Option<TokioAsyncResolver>,
}

impl SystemResolver {
    /// Builds a resolver from the system configuration.
    ///
    /// Never fails: without a usable configuration only literal addresses
    /// resolve and reverse lookups yield nothing.
    pub fn from_system_conf() -> Self {
        let inner = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!("Failed to create DNS resolver: {}", e);
                None
            }
        };
        Self { inner }
    }
}

#[async_trait]
impl AddressResolver for SystemResolver {
    async fn resolve(&self, name: &str, family: AddressFamily) -> Result<IpAddr, ProbeError> {
        let resolve_error = |reason: String| ProbeError::Resolve {
            target: name.to_string(),
            reason,
        };

        // Literal addresses skip DNS entirely
        if let Ok(ip) = name.parse::<IpAddr>() {
            if family.matches(ip) {
                return Ok(ip);
            }
            return Err(resolve_error(format!("not an IP{} address", family)));
        }

        let resolver = self
            .inner
            .as_ref()
            .ok_or_else(|| resolve_error("no DNS resolver configured".to_string()))?;

        let lookup = resolver
            .lookup_ip(name)
            .await
            .map_err(|e| resolve_error(e.to_string()))?;

        let address = lookup
            .iter()
            .find(|ip| family.matches(*ip))
            .ok_or_else(|| resolve_error(format!("no IP{} address found", family)))?;
        debug!(target = %name, ip = %address, "Resolved target");
        Ok(address)
    }

    async fn reverse_lookup(&self, addr: IpAddr) -> Option<String> {
        let resolver = self.inner.as_ref()?;
        let names = resolver.reverse_lookup(addr).await.ok()?;
        let name = names.iter().next()?.to_string();
        Some(name.trim_end_matches('.').to_string())
    }
}

/// Pings every host concurrently; reports come back in input order.
pub async fn run_ping(
    hosts: Vec<String>,
    params: EchoParams,
    sessions: Arc<dyn SessionFactory>,
    resolver: Arc<dyn AddressResolver>,
) -> Result<Vec<HostReport>, ProbeError> {
    let prober = EchoProber::new(sessions, resolver, params)?;
    run_all(hosts, move |host: String| {
        let prober = prober.clone();
        async move { prober.run(&host).await }
    })
    .await
}

/// Traces every host concurrently; reports come back in input order.
pub async fn run_traceroute(
    hosts: Vec<String>,
    params: TraceParams,
    sessions: Arc<dyn SessionFactory>,
    resolver: Arc<dyn AddressResolver>,
) -> Result<Vec<TraceReport>, ProbeError> {
    let tracer = HopTracer::new(sessions, resolver, params)?;
    run_all(hosts, move |host: String| {
        let tracer = tracer.clone();
        async move { tracer.run(&host).await }
    })
    .await
}
