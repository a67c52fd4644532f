//! Seams between the probing logic and the outside world.

use crate::{AddressFamily, ProbeError};
use async_trait::async_trait;
use std::net::IpAddr;
use tokio::time::Instant;

/// A transport bound to one address family, able to send an encoded ICMP
/// message and wait for whatever ICMP traffic arrives next.
///
/// Sessions are owned by exactly one probing run and are never shared
/// between targets. Dropping a session releases the underlying socket.
#[async_trait]
pub trait ProbeSession: Send {
    /// Address family this session was opened for.
    fn family(&self) -> AddressFamily;

    /// Sends an encoded ICMP message to `destination`.
    async fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<(), ProbeError>;

    /// Waits for the next ICMP message, up to `deadline`.
    ///
    /// Returns the source address and the ICMP message bytes (any IP header
    /// stripped). Returns `ProbeError::Timeout` once the deadline passes.
    async fn receive(&mut self, deadline: Instant) -> Result<(IpAddr, Vec<u8>), ProbeError>;

    /// Closes the session, releasing resources.
    async fn close(&mut self) -> Result<(), ProbeError>;
}

/// Opens probe sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a session for `family`. When `hop_limit` is set, every message
    /// sent through the session carries that TTL (IPv4) or hop limit (IPv6).
    ///
    /// Fails with `ProbeError::Permission` when the process may not open raw
    /// sockets.
    async fn open(
        &self,
        family: AddressFamily,
        hop_limit: Option<u8>,
    ) -> Result<Box<dyn ProbeSession>, ProbeError>;
}

/// Name resolution used by the probers.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolves a hostname or literal address to an address of `family`.
    async fn resolve(&self, name: &str, family: AddressFamily) -> Result<IpAddr, ProbeError>;

    /// Best-effort reverse lookup. `None` on any failure.
    async fn reverse_lookup(&self, addr: IpAddr) -> Option<String>;
}
