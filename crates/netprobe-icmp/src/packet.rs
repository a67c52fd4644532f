//! ICMP and ICMPv6 echo message encoding and decoding using pnet.
//!
//! Both families share the echo header layout (type, code, checksum,
//! identifier, sequence). The IPv4 checksum is computed and verified here;
//! for ICMPv6 the checksum covers a pseudo-header the kernel fills in, so it
//! is left zero on send and not checked on receive.

use netprobe_core::{AddressFamily, DecodeError, EncodeError, ReplyKind};
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{self, IcmpCode, IcmpPacket, IcmpType};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::Packet;
use std::net::IpAddr;

/// Size of the echo header: type, code, checksum, identifier, sequence.
pub const ECHO_HEADER_LEN: usize = 8;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_TIME_EXCEEDED: u8 = 11;

const ICMPV6_DEST_UNREACHABLE: u8 = 1;
const ICMPV6_TIME_EXCEEDED: u8 = 3;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Direction of an echo message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    Request,
    Reply,
}

impl EchoKind {
    fn icmp_type(self, family: AddressFamily) -> u8 {
        match (self, family) {
            (EchoKind::Request, AddressFamily::V4) => ICMP_ECHO_REQUEST,
            (EchoKind::Reply, AddressFamily::V4) => ICMP_ECHO_REPLY,
            (EchoKind::Request, AddressFamily::V6) => ICMPV6_ECHO_REQUEST,
            (EchoKind::Reply, AddressFamily::V6) => ICMPV6_ECHO_REPLY,
        }
    }
}

/// An ICMP echo request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    pub kind: EchoKind,
    pub code: u8,
    /// Distinguishes this process's probes from other ICMP traffic.
    pub identifier: u16,
    /// Distinguishes probes within one run.
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl EchoMessage {
    pub fn request(identifier: u16, sequence: u16, payload: &[u8]) -> Self {
        Self {
            kind: EchoKind::Request,
            code: 0,
            identifier,
            sequence,
            payload: payload.to_vec(),
        }
    }

    pub fn reply(identifier: u16, sequence: u16, payload: &[u8]) -> Self {
        Self {
            kind: EchoKind::Reply,
            ..Self::request(identifier, sequence, payload)
        }
    }
}

/// A decoded ICMP message of one of the kinds the probers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcmpMessage {
    Echo(EchoMessage),
    /// Time exceeded or destination unreachable, quoting the start of the
    /// datagram that triggered it.
    Error {
        kind: ReplyKind,
        code: u8,
        original: Vec<u8>,
    },
}

impl IcmpMessage {
    /// The kind of reply this message represents, if it is a reply at all.
    pub fn reply_kind(&self) -> Option<ReplyKind> {
        match self {
            IcmpMessage::Echo(echo) if echo.kind == EchoKind::Reply => Some(ReplyKind::EchoReply),
            IcmpMessage::Echo(_) => None,
            IcmpMessage::Error { kind, .. } => Some(*kind),
        }
    }
}

/// Identifying fields of an echo request quoted inside an ICMP error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedEcho {
    pub destination: IpAddr,
    pub identifier: u16,
    pub sequence: u16,
}

/// Encodes an echo message for `family`.
pub fn encode(message: &EchoMessage, family: AddressFamily) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + message.payload.len()];
    let len = buffer.len();

    {
        let mut echo = MutableEchoRequestPacket::new(&mut buffer)
            .ok_or(EncodeError::BufferTooSmall(len))?;
        echo.set_icmp_type(IcmpType::new(message.kind.icmp_type(family)));
        echo.set_icmp_code(IcmpCode::new(message.code));
        echo.set_identifier(message.identifier);
        echo.set_sequence_number(message.sequence);
        echo.set_payload(&message.payload);
    }

    if family == AddressFamily::V4 {
        let view = IcmpPacket::new(&buffer).ok_or(EncodeError::BufferTooSmall(len))?;
        let checksum = icmp::checksum(&view);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    Ok(buffer)
}

/// Decodes an ICMP message (no IP header) received over `family`.
pub fn decode(bytes: &[u8], family: AddressFamily) -> Result<IcmpMessage, DecodeError> {
    if bytes.len() < ECHO_HEADER_LEN {
        return Err(DecodeError::TooShort {
            expected: ECHO_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let packet = IcmpPacket::new(bytes).ok_or(DecodeError::TooShort {
        expected: ECHO_HEADER_LEN,
        actual: bytes.len(),
    })?;
    let icmp_type = packet.get_icmp_type().0;
    let code = packet.get_icmp_code().0;

    if family == AddressFamily::V4 {
        let computed = icmp::checksum(&packet);
        let carried = packet.get_checksum();
        if computed != carried {
            return Err(DecodeError::BadChecksum { carried, computed });
        }
    }

    let echo_kind = match (family, icmp_type) {
        (AddressFamily::V4, ICMP_ECHO_REQUEST) | (AddressFamily::V6, ICMPV6_ECHO_REQUEST) => {
            Some(EchoKind::Request)
        }
        (AddressFamily::V4, ICMP_ECHO_REPLY) | (AddressFamily::V6, ICMPV6_ECHO_REPLY) => {
            Some(EchoKind::Reply)
        }
        _ => None,
    };

    if let Some(kind) = echo_kind {
        if code != 0 {
            return Err(DecodeError::Unrecognized {
                family,
                icmp_type,
                code,
            });
        }
        return decode_echo(bytes, kind);
    }

    let error_kind = match (family, icmp_type) {
        (AddressFamily::V4, ICMP_TIME_EXCEEDED) if code <= 1 => Some(ReplyKind::TimeExceeded),
        (AddressFamily::V6, ICMPV6_TIME_EXCEEDED) if code <= 1 => Some(ReplyKind::TimeExceeded),
        (AddressFamily::V4, ICMP_DEST_UNREACHABLE) if code <= 15 => {
            Some(ReplyKind::DestinationUnreachable)
        }
        (AddressFamily::V6, ICMPV6_DEST_UNREACHABLE) if code <= 7 => {
            Some(ReplyKind::DestinationUnreachable)
        }
        _ => None,
    };

    match error_kind {
        Some(kind) => Ok(IcmpMessage::Error {
            kind,
            code,
            // Bytes 4..8 are unused in both error formats
            original: bytes[ECHO_HEADER_LEN..].to_vec(),
        }),
        None => Err(DecodeError::Unrecognized {
            family,
            icmp_type,
            code,
        }),
    }
}

fn decode_echo(bytes: &[u8], kind: EchoKind) -> Result<IcmpMessage, DecodeError> {
    // Request and reply share a layout; the reply view reads either.
    let echo = EchoReplyPacket::new(bytes).ok_or(DecodeError::TooShort {
        expected: ECHO_HEADER_LEN,
        actual: bytes.len(),
    })?;

    Ok(IcmpMessage::Echo(EchoMessage {
        kind,
        code: echo.get_icmp_code().0,
        identifier: echo.get_identifier(),
        sequence: echo.get_sequence_number(),
        payload: echo.payload().to_vec(),
    }))
}

/// Extracts the echo request quoted inside an ICMP error's original datagram.
///
/// Returns `None` if the quoted datagram is not one of our echo requests.
pub fn quoted_echo(original: &[u8], family: AddressFamily) -> Option<QuotedEcho> {
    let (destination, inner, request_type) = match family {
        AddressFamily::V4 => {
            let ip = Ipv4Packet::new(original)?;
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
                return None;
            }
            let header_len = usize::from(ip.get_header_length()) * 4;
            if header_len < IPV4_MIN_HEADER_LEN {
                return None;
            }
            (
                IpAddr::V4(ip.get_destination()),
                original.get(header_len..)?,
                ICMP_ECHO_REQUEST,
            )
        }
        AddressFamily::V6 => {
            let ip = Ipv6Packet::new(original)?;
            if ip.get_next_header() != IpNextHeaderProtocols::Icmpv6 {
                return None;
            }
            (
                IpAddr::V6(ip.get_destination()),
                original.get(IPV6_HEADER_LEN..)?,
                ICMPV6_ECHO_REQUEST,
            )
        }
    };

    // Routers only guarantee the first eight bytes of the quoted ICMP header.
    if inner.len() < ECHO_HEADER_LEN || inner[0] != request_type {
        return None;
    }

    Some(QuotedEcho {
        destination,
        identifier: u16::from_be_bytes([inner[4], inner[5]]),
        sequence: u16::from_be_bytes([inner[6], inner[7]]),
    })
}

/// Strips the IPv4 header raw IPv4 ICMP sockets deliver in front of the
/// ICMP message. Returns `None` if the header is malformed.
pub fn strip_ipv4_header(datagram: &[u8]) -> Option<&[u8]> {
    let ip = Ipv4Packet::new(datagram)?;
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return None;
    }
    datagram.get(header_len..)
}
