//! Raw ICMP socket session.
//!
//! One socket per session, opened with `SOCK_RAW` for ICMP or ICMPv6. The
//! TTL / hop limit is fixed when the session is opened, so a hop trace opens
//! a fresh session per TTL.

use async_trait::async_trait;
use netprobe_core::{AddressFamily, ProbeError, ProbeSession, SessionFactory};
use std::net::IpAddr;
use tokio::time::Instant;
use tracing::{debug, trace};

#[cfg(unix)]
use crate::packet::strip_ipv4_header;
#[cfg(unix)]
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
#[cfg(unix)]
use std::mem::MaybeUninit;
#[cfg(unix)]
use std::net::SocketAddr;
#[cfg(unix)]
use tokio::io::unix::AsyncFd;

/// Large enough for any ICMP message on a standard MTU path.
const RECV_BUFFER_LEN: usize = 1500;

/// Opens raw ICMP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSessionFactory;

#[async_trait]
impl SessionFactory for RawSessionFactory {
    async fn open(
        &self,
        family: AddressFamily,
        hop_limit: Option<u8>,
    ) -> Result<Box<dyn ProbeSession>, ProbeError> {
        #[cfg(unix)]
        return Ok(Box::new(RawSocketSession::open(family, hop_limit)?));

        #[cfg(not(unix))]
        return Err(ProbeError::SocketCreation(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!(
                "raw ICMP{} sockets are not supported on this platform (hop limit {:?})",
                family, hop_limit
            ),
        )));
    }
}

/// A raw ICMP socket registered with the tokio reactor.
#[cfg(unix)]
pub struct RawSocketSession {
    socket: Option<AsyncFd<Socket>>,
    family: AddressFamily,
}

#[cfg(unix)]
impl RawSocketSession {
    /// Opens a raw socket for `family`, optionally fixing its TTL / hop limit.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(family: AddressFamily, hop_limit: Option<u8>) -> Result<Self, ProbeError> {
        let (domain, protocol) = match family {
            AddressFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            AddressFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };

        let socket = Socket::new(domain, Type::RAW, Some(protocol)).map_err(open_error)?;
        socket
            .set_nonblocking(true)
            .map_err(ProbeError::SocketCreation)?;

        if let Some(limit) = hop_limit {
            match family {
                AddressFamily::V4 => socket.set_ttl(u32::from(limit)),
                AddressFamily::V6 => socket.set_unicast_hops_v6(u32::from(limit)),
            }
            .map_err(ProbeError::SocketCreation)?;
        }

        let socket = AsyncFd::new(socket).map_err(ProbeError::SocketCreation)?;
        debug!(family = %family, hop_limit = ?hop_limit, "Opened raw ICMP socket");

        Ok(Self {
            socket: Some(socket),
            family,
        })
    }

    fn socket(&self) -> Result<&AsyncFd<Socket>, ProbeError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ProbeError::Internal("session already closed".to_string()))
    }
}

#[cfg(unix)]
fn open_error(err: std::io::Error) -> ProbeError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        ProbeError::Permission(err)
    } else {
        ProbeError::SocketCreation(err)
    }
}

/// Reads one datagram, returning its source and bytes.
#[cfg(unix)]
fn recv_datagram(socket: &Socket) -> std::io::Result<(IpAddr, Vec<u8>)> {
    let mut buffer = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_LEN];
    let (n, from) = socket.recv_from(&mut buffer)?;

    // SAFETY: recv_from initialised the first `n` bytes.
    let bytes = buffer[..n]
        .iter()
        .map(|b| unsafe { b.assume_init() })
        .collect();

    let source = from.as_socket().map(|addr| addr.ip()).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "non-IP source address")
    })?;

    Ok((source, bytes))
}

#[cfg(unix)]
#[async_trait]
impl ProbeSession for RawSocketSession {
    fn family(&self) -> AddressFamily {
        self.family
    }

    async fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<(), ProbeError> {
        let socket = self.socket()?;
        // ICMP has no ports
        let addr = SockAddr::from(SocketAddr::new(destination, 0));

        loop {
            let mut guard = socket.writable().await.map_err(ProbeError::Send)?;
            match guard.try_io(|inner| inner.get_ref().send_to(packet, &addr)) {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => return Err(ProbeError::Send(e)),
                Err(_would_block) => continue,
            }
        }
    }

    async fn receive(&mut self, deadline: Instant) -> Result<(IpAddr, Vec<u8>), ProbeError> {
        let socket = self.socket()?;

        let read = async {
            loop {
                let mut guard = socket.readable().await?;
                match guard.try_io(|inner| recv_datagram(inner.get_ref())) {
                    Ok(result) => return result,
                    Err(_would_block) => continue,
                }
            }
        };

        let (source, datagram) = match tokio::time::timeout_at(deadline, read).await {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout),
        };

        trace!(source = %source, len = datagram.len(), "Received ICMP datagram");

        // Raw IPv4 sockets hand us the IP header; IPv6 ones do not.
        let message = match self.family {
            AddressFamily::V4 => strip_ipv4_header(&datagram).unwrap_or_default().to_vec(),
            AddressFamily::V6 => datagram,
        };

        Ok((source, message))
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        // Dropping the AsyncFd deregisters and closes the socket
        self.socket.take();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_reports_permission_or_succeeds() {
        // Unprivileged test runs cannot open raw sockets; either outcome is
        // acceptable, but a permission failure must be reported as such.
        match RawSessionFactory.open(AddressFamily::V4, Some(3)).await {
            Ok(mut session) => {
                assert_eq!(session.family(), AddressFamily::V4);
                session.close().await.unwrap();
            }
            Err(e) => assert!(
                matches!(e, ProbeError::Permission(_) | ProbeError::SocketCreation(_)),
                "unexpected error: {}",
                e
            ),
        }
    }

    #[tokio::test]
    async fn test_closed_session_rejects_io() {
        let Ok(mut session) = RawSocketSession::open(AddressFamily::V4, None) else {
            return;
        };
        session.close().await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(matches!(
            session.receive(deadline).await,
            Err(ProbeError::Internal(_))
        ));
    }
}
