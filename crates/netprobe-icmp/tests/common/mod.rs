//! Scripted in-memory network for exercising the probers without raw sockets.

#![allow(dead_code)]

use async_trait::async_trait;
use netprobe_core::{AddressFamily, AddressResolver, ProbeError, ProbeSession, SessionFactory};
use netprobe_icmp::packet::{decode, encode, EchoKind, EchoMessage, IcmpMessage};
use pnet_packet::icmp::{self, IcmpPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::ipv6::MutableIpv6Packet;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// How the target answers once a probe reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetBehavior {
    EchoReply,
    Silent,
    Unreachable,
    Garbage,
}

/// A path to one target: routers in TTL order (None for hops that stay
/// quiet) followed by the target itself.
pub struct FakeNetwork {
    pub target: IpAddr,
    pub routers: Vec<Option<IpAddr>>,
    pub behavior: TargetBehavior,
    pub deny_permission: bool,
    /// Number of upcoming session opens to refuse before allowing the rest.
    pub denials_left: Mutex<usize>,
    pub fail_sends: Vec<u16>,
    /// Inject unrelated ICMP traffic ahead of every real answer.
    pub noise: bool,
    pub opened: Mutex<Vec<Option<u8>>>,
    pub sent: Mutex<Vec<(IpAddr, u16, u16)>>,
}

impl FakeNetwork {
    pub fn new(target: IpAddr) -> Self {
        Self {
            target,
            routers: Vec::new(),
            behavior: TargetBehavior::EchoReply,
            deny_permission: false,
            denials_left: Mutex::new(0),
            fail_sends: Vec::new(),
            noise: false,
            opened: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_routers(mut self, routers: Vec<Option<IpAddr>>) -> Self {
        self.routers = routers;
        self
    }

    pub fn with_behavior(mut self, behavior: TargetBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn denying_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    pub fn denying_next_opens(self, count: usize) -> Self {
        *self.denials_left.lock().unwrap() = count;
        self
    }

    pub fn failing_sends(mut self, seqs: Vec<u16>) -> Self {
        self.fail_sends = seqs;
        self
    }

    pub fn noisy(mut self) -> Self {
        self.noise = true;
        self
    }

    /// TTL at which a probe first reaches the target.
    pub fn distance(&self) -> u8 {
        self.routers.len() as u8 + 1
    }

    pub fn opened_hop_limits(&self) -> Vec<Option<u8>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn sent_sequences(&self) -> Vec<u16> {
        self.sent.lock().unwrap().iter().map(|(_, _, seq)| *seq).collect()
    }

    fn answer(
        &self,
        family: AddressFamily,
        hop_limit: Option<u8>,
        request: &[u8],
    ) -> Vec<(IpAddr, Vec<u8>)> {
        let Ok(IcmpMessage::Echo(echo)) = decode(request, family) else {
            return Vec::new();
        };
        let mut replies = Vec::new();

        if self.noise {
            let stale = EchoMessage::reply(echo.identifier, echo.sequence.wrapping_sub(1), b"old");
            replies.push((self.target, encode(&stale, family).unwrap()));
            let other =
                EchoMessage::reply(echo.identifier.wrapping_add(1), echo.sequence, b"other");
            replies.push((self.target, encode(&other, family).unwrap()));
        }

        let reached = hop_limit.map_or(true, |limit| limit >= self.distance());
        if !reached {
            let hop = usize::from(hop_limit.unwrap_or(1)) - 1;
            if let Some(Some(router)) = self.routers.get(hop) {
                let message =
                    icmp_error(family, time_exceeded_type(family), 0, self.target, request);
                replies.push((*router, message));
            }
            return replies;
        }

        match self.behavior {
            TargetBehavior::EchoReply => {
                let reply = EchoMessage::reply(echo.identifier, echo.sequence, &echo.payload);
                replies.push((self.target, encode(&reply, family).unwrap()));
            }
            TargetBehavior::Unreachable => {
                let message = icmp_error(family, unreachable_type(family), 3, self.target, request);
                replies.push((self.target, message));
            }
            TargetBehavior::Garbage => replies.push((self.target, vec![0, 0, 0])),
            TargetBehavior::Silent => {}
        }
        replies
    }
}

fn time_exceeded_type(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::V4 => 11,
        AddressFamily::V6 => 3,
    }
}

fn unreachable_type(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::V4 => 3,
        AddressFamily::V6 => 1,
    }
}

/// Builds an ICMP error quoting `request` as sent to `destination`.
pub fn icmp_error(
    family: AddressFamily,
    icmp_type: u8,
    code: u8,
    destination: IpAddr,
    request: &[u8],
) -> Vec<u8> {
    let mut message = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
    match (family, destination) {
        (AddressFamily::V4, IpAddr::V4(dst)) => {
            let mut quoted = vec![0u8; 20 + request.len()];
            {
                let mut ip = MutableIpv4Packet::new(&mut quoted).unwrap();
                ip.set_version(4);
                ip.set_header_length(5);
                ip.set_total_length((20 + request.len()) as u16);
                ip.set_ttl(1);
                ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
                ip.set_source(Ipv4Addr::new(10, 0, 0, 2));
                ip.set_destination(dst);
            }
            quoted[20..].copy_from_slice(request);
            message.extend_from_slice(&quoted);

            let checksum = icmp::checksum(&IcmpPacket::new(&message).unwrap());
            message[2..4].copy_from_slice(&checksum.to_be_bytes());
        }
        (AddressFamily::V6, IpAddr::V6(dst)) => {
            let mut quoted = vec![0u8; 40 + request.len()];
            {
                let mut ip = MutableIpv6Packet::new(&mut quoted).unwrap();
                ip.set_version(6);
                ip.set_payload_length(request.len() as u16);
                ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
                ip.set_hop_limit(1);
                ip.set_source(Ipv6Addr::LOCALHOST);
                ip.set_destination(dst);
            }
            quoted[40..].copy_from_slice(request);
            message.extend_from_slice(&quoted);
        }
        _ => panic!("destination does not match family {}", family),
    }
    message
}

pub struct FakeSessionFactory {
    pub network: Arc<FakeNetwork>,
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(
        &self,
        family: AddressFamily,
        hop_limit: Option<u8>,
    ) -> Result<Box<dyn ProbeSession>, ProbeError> {
        let denied = {
            let mut left = self.network.denials_left.lock().unwrap();
            let denied = *left > 0;
            *left = left.saturating_sub(1);
            denied
        };
        if self.network.deny_permission || denied {
            return Err(ProbeError::Permission(io::Error::from(
                io::ErrorKind::PermissionDenied,
            )));
        }
        self.network.opened.lock().unwrap().push(hop_limit);
        Ok(Box::new(FakeSession {
            network: Arc::clone(&self.network),
            family,
            hop_limit,
            pending: VecDeque::new(),
        }))
    }
}

struct FakeSession {
    network: Arc<FakeNetwork>,
    family: AddressFamily,
    hop_limit: Option<u8>,
    pending: VecDeque<(IpAddr, Vec<u8>)>,
}

#[async_trait]
impl ProbeSession for FakeSession {
    fn family(&self) -> AddressFamily {
        self.family
    }

    async fn send(&mut self, packet: &[u8], destination: IpAddr) -> Result<(), ProbeError> {
        let Ok(IcmpMessage::Echo(echo)) = decode(packet, self.family) else {
            return Err(ProbeError::Internal("fake network only carries echo requests".into()));
        };
        assert_eq!(echo.kind, EchoKind::Request);
        self.network
            .sent
            .lock()
            .unwrap()
            .push((destination, echo.identifier, echo.sequence));

        if self.network.fail_sends.contains(&echo.sequence) {
            return Err(ProbeError::Send(io::Error::new(
                io::ErrorKind::Other,
                "network is unreachable",
            )));
        }

        let replies = self.network.answer(self.family, self.hop_limit, packet);
        self.pending.extend(replies);
        Ok(())
    }

    async fn receive(&mut self, deadline: Instant) -> Result<(IpAddr, Vec<u8>), ProbeError> {
        match self.pending.pop_front() {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep_until(deadline).await;
                Err(ProbeError::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        self.pending.clear();
        Ok(())
    }
}

/// Resolves a fixed table of names; everything else fails.
#[derive(Default)]
pub struct FakeResolver {
    pub hosts: HashMap<String, IpAddr>,
    pub names: HashMap<IpAddr, String>,
    pub reverse_lookups: Mutex<Vec<IpAddr>>,
}

impl FakeResolver {
    pub fn with_host(mut self, name: &str, addr: IpAddr) -> Self {
        self.hosts.insert(name.to_string(), addr);
        self
    }

    pub fn with_name(mut self, addr: IpAddr, name: &str) -> Self {
        self.names.insert(addr, name.to_string());
        self
    }
}

#[async_trait]
impl AddressResolver for FakeResolver {
    async fn resolve(&self, name: &str, family: AddressFamily) -> Result<IpAddr, ProbeError> {
        let addr = name
            .parse::<IpAddr>()
            .ok()
            .or_else(|| self.hosts.get(name).copied())
            .ok_or_else(|| ProbeError::Resolve {
                target: name.to_string(),
                reason: "no such host".to_string(),
            })?;
        if !family.matches(addr) {
            return Err(ProbeError::Resolve {
                target: name.to_string(),
                reason: format!("no {} address", family),
            });
        }
        Ok(addr)
    }

    async fn reverse_lookup(&self, addr: IpAddr) -> Option<String> {
        self.reverse_lookups.lock().unwrap().push(addr);
        self.names.get(&addr).cloned()
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
