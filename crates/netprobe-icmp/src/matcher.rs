//! Matching received ICMP traffic against the one outstanding probe.
//!
//! A raw ICMP socket sees every ICMP message delivered to the host, so most
//! of what arrives belongs to someone else: other processes, other targets
//! probed concurrently by this process, stale replies to earlier probes, and
//! on loopback our own echo requests.

use crate::packet::{decode, quoted_echo, EchoKind, IcmpMessage};
use netprobe_core::{AddressFamily, DecodeError, ReplyKind};
use std::net::IpAddr;

/// The probe currently waiting for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outstanding {
    pub target: IpAddr,
    pub identifier: u16,
    pub sequence: u16,
}

/// What a received packet means for the outstanding probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The target answered our echo request.
    EchoReply,
    /// An ICMP error quoting our echo request.
    Related(ReplyKind),
    /// The target sent bytes we could not make sense of.
    Malformed(DecodeError),
    /// Not ours; keep waiting.
    Foreign,
}

impl Outstanding {
    /// Classifies an ICMP message (IP header already stripped) from `source`.
    pub fn classify(&self, source: IpAddr, bytes: &[u8], family: AddressFamily) -> Verdict {
        let message = match decode(bytes, family) {
            Ok(message) => message,
            Err(e) if e.is_malformed() && source == self.target => return Verdict::Malformed(e),
            Err(_) => return Verdict::Foreign,
        };

        match message {
            IcmpMessage::Echo(echo) => {
                if echo.kind == EchoKind::Reply
                    && source == self.target
                    && echo.identifier == self.identifier
                    && echo.sequence == self.sequence
                {
                    Verdict::EchoReply
                } else {
                    Verdict::Foreign
                }
            }
            IcmpMessage::Error { kind, original, .. } => match quoted_echo(&original, family) {
                Some(quoted)
                    if quoted.destination == self.target
                        && quoted.identifier == self.identifier
                        && quoted.sequence == self.sequence =>
                {
                    Verdict::Related(kind)
                }
                _ => Verdict::Foreign,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode, EchoMessage};
    use pnet_packet::icmp::{self, IcmpPacket};
    use pnet_packet::ip::IpNextHeaderProtocols;
    use pnet_packet::ipv6::MutableIpv6Packet;
    use std::net::Ipv6Addr;

    const TARGET: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(198, 51, 100, 7));

    fn outstanding() -> Outstanding {
        Outstanding {
            target: TARGET,
            identifier: 77,
            sequence: 3,
        }
    }

    fn reply(identifier: u16, sequence: u16) -> Vec<u8> {
        encode(&EchoMessage::reply(identifier, sequence, b"x"), AddressFamily::V4).unwrap()
    }

    #[test]
    fn test_matching_reply() {
        let verdict = outstanding().classify(TARGET, &reply(77, 3), AddressFamily::V4);
        assert_eq!(verdict, Verdict::EchoReply);
    }

    #[test]
    fn test_foreign_traffic_is_skipped() {
        let probe = outstanding();
        let elsewhere: IpAddr = "192.0.2.1".parse().unwrap();

        // Wrong identifier, stale sequence, wrong source
        assert_eq!(probe.classify(TARGET, &reply(78, 3), AddressFamily::V4), Verdict::Foreign);
        assert_eq!(probe.classify(TARGET, &reply(77, 2), AddressFamily::V4), Verdict::Foreign);
        assert_eq!(probe.classify(elsewhere, &reply(77, 3), AddressFamily::V4), Verdict::Foreign);

        // Our own request looped back
        let request = encode(&EchoMessage::request(77, 3, b"x"), AddressFamily::V4).unwrap();
        assert_eq!(probe.classify(TARGET, &request, AddressFamily::V4), Verdict::Foreign);

        // Garbage from someone else
        assert_eq!(probe.classify(elsewhere, &[1, 2], AddressFamily::V4), Verdict::Foreign);
    }

    #[test]
    fn test_malformed_from_target() {
        let verdict = outstanding().classify(TARGET, &[0, 0, 0, 0], AddressFamily::V4);
        assert!(matches!(verdict, Verdict::Malformed(DecodeError::TooShort { .. })));
    }

    #[test]
    fn test_related_error_v6() {
        let target: IpAddr = "2001:db8::7".parse().unwrap();
        let router: IpAddr = "2001:db8::1".parse().unwrap();
        let probe = Outstanding {
            target,
            identifier: 5,
            sequence: 9,
        };

        let request = encode(&EchoMessage::request(5, 9, b"x"), AddressFamily::V6).unwrap();
        let mut quoted = vec![0u8; 40 + request.len()];
        {
            let mut ip = MutableIpv6Packet::new(&mut quoted).unwrap();
            ip.set_version(6);
            ip.set_payload_length(request.len() as u16);
            ip.set_next_header(IpNextHeaderProtocols::Icmpv6);
            ip.set_hop_limit(1);
            ip.set_source(Ipv6Addr::LOCALHOST);
            ip.set_destination("2001:db8::7".parse().unwrap());
        }
        quoted[40..].copy_from_slice(&request);

        let mut message = vec![3, 0, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(&quoted);

        assert_eq!(
            probe.classify(router, &message, AddressFamily::V6),
            Verdict::Related(ReplyKind::TimeExceeded)
        );

        let other = Outstanding {
            sequence: 10,
            ..probe
        };
        assert_eq!(other.classify(router, &message, AddressFamily::V6), Verdict::Foreign);
    }

    #[test]
    fn test_related_error_v4_checksum_is_verified() {
        let mut message = vec![11, 0, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(&[0u8; 28]);
        let checksum = icmp::checksum(&IcmpPacket::new(&message).unwrap());
        message[2..4].copy_from_slice(&checksum.wrapping_add(1).to_be_bytes());

        let verdict = outstanding().classify(TARGET, &message, AddressFamily::V4);
        assert!(matches!(verdict, Verdict::Malformed(DecodeError::BadChecksum { .. })));
    }
}
