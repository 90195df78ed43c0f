//! Header views used by filter matching and link-layer reconstruction.

use crate::network::core::device::{MacAddr, NetDevice, ETH_ALEN};
use std::net::Ipv4Addr;

/// Length of an Ethernet header.
pub const ETH_HLEN: usize = 14;

/// Smallest ethertype value; anything below is an 802.3 length field.
pub const ETH_P_802_3_MIN: u16 = 0x0600;
pub const ETH_P_802_3: u16 = 0x0001;
pub const ETH_P_802_2: u16 = 0x0004;
pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_ARP: u16 = 0x0806;
pub const ETH_P_IPV6: u16 = 0x86dd;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_DCCP: u8 = 33;
pub const IPPROTO_SCTP: u8 = 132;
pub const IPPROTO_UDPLITE: u8 = 136;

const IPV4_MIN_HLEN: usize = 20;
const IP_OFFSET_MASK: u16 = 0x1fff;

/// An Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHeader {
    pub dest: MacAddr,
    pub source: MacAddr,
    pub ethertype: u16,
}

impl EthHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ETH_HLEN {
            return None;
        }
        Some(Self {
            dest: MacAddr::from_slice(&bytes[..ETH_ALEN])?,
            source: MacAddr::from_slice(&bytes[ETH_ALEN..2 * ETH_ALEN])?,
            ethertype: u16::from_be_bytes([bytes[12], bytes[13]]),
        })
    }

    /// Serialises the header into the first `ETH_HLEN` bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        out[..ETH_ALEN].copy_from_slice(&self.dest.octets());
        out[ETH_ALEN..2 * ETH_ALEN].copy_from_slice(&self.source.octets());
        out[12..ETH_HLEN].copy_from_slice(&self.ethertype.to_be_bytes());
    }
}

/// How a received frame relates to the receiving interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketType {
    /// Addressed to this host
    #[default]
    Host,
    Broadcast,
    Multicast,
    /// Addressed to some other host
    OtherHost,
    /// Locally generated, leaving the host
    Outgoing,
}

/// Classifies a frame arriving on `dev`, returning its protocol and packet type.
///
/// `payload` is the frame after the link header. Same rules as the kernel's
/// `eth_type_trans`.
pub fn classify_frame(header: &EthHeader, payload: &[u8], dev: &NetDevice) -> (u16, PacketType) {
    let pkt_type = if header.dest.is_multicast() {
        if header.dest.is_broadcast() {
            PacketType::Broadcast
        } else {
            PacketType::Multicast
        }
    } else if header.dest != dev.hw_addr() {
        PacketType::OtherHost
    } else {
        PacketType::Host
    };

    let protocol = if header.ethertype >= ETH_P_802_3_MIN {
        header.ethertype
    } else if payload.starts_with(&[0xff, 0xff]) {
        // Raw 802.3 (IPX) frames start the payload with 0xFFFF.
        ETH_P_802_3
    } else {
        ETH_P_802_2
    };

    (protocol, pkt_type)
}

/// Fields of an IPv4 header that filters can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Summary {
    pub protocol: u8,
    pub saddr: Ipv4Addr,
    pub daddr: Ipv4Addr,
    pub header_len: usize,
    pub fragment_offset: u16,
}

/// Source and destination ports of a transport header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub source: u16,
    pub dest: u16,
}

/// Headers found in a packet whose data starts at the network header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeaders {
    pub network: Option<Ipv4Summary>,
    pub transport: Option<Ports>,
}

impl PacketHeaders {
    /// Parses the network and transport headers of `data`.
    ///
    /// Anything that is not a well-formed IPv4 header yields no network header.
    /// Ports are read only for protocols that carry them at offsets 0 and 2,
    /// and never for non-first fragments.
    pub fn parse(protocol: u16, data: &[u8]) -> Self {
        let Some(network) = parse_ipv4(protocol, data) else {
            return Self::default();
        };

        let transport = if network.fragment_offset == 0 && carries_ports(network.protocol) {
            data.get(network.header_len..network.header_len + 4)
                .map(|ports| Ports {
                    source: u16::from_be_bytes([ports[0], ports[1]]),
                    dest: u16::from_be_bytes([ports[2], ports[3]]),
                })
        } else {
            None
        };

        Self {
            network: Some(network),
            transport,
        }
    }
}

fn parse_ipv4(protocol: u16, data: &[u8]) -> Option<Ipv4Summary> {
    if protocol != ETH_P_IP || data.len() < IPV4_MIN_HLEN {
        return None;
    }

    let version = data[0] >> 4;
    let header_len = usize::from(data[0] & 0x0f) * 4;
    if version != 4 || header_len < IPV4_MIN_HLEN || data.len() < header_len {
        return None;
    }

    let frag = u16::from_be_bytes([data[6], data[7]]);
    Some(Ipv4Summary {
        protocol: data[9],
        saddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
        daddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        header_len,
        fragment_offset: frag & IP_OFFSET_MASK,
    })
}

fn carries_ports(protocol: u8) -> bool {
    matches!(
        protocol,
        IPPROTO_TCP | IPPROTO_UDP | IPPROTO_UDPLITE | IPPROTO_SCTP | IPPROTO_DCCP
    )
}

/// Guesses the link-layer protocol of a bare network packet from its version nibble.
pub fn protocol_of(data: &[u8]) -> u16 {
    match data.first().map(|b| b >> 4) {
        Some(4) => ETH_P_IP,
        Some(6) => ETH_P_IPV6,
        _ => 0,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Builds a minimal IPv4 packet with a transport header carrying ports.
    pub fn ipv4_packet(
        protocol: u8,
        saddr: [u8; 4],
        daddr: [u8; 4],
        sport: u16,
        dport: u16,
    ) -> Vec<u8> {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&40u16.to_be_bytes());
        pkt[8] = 64;
        pkt[9] = protocol;
        pkt[12..16].copy_from_slice(&saddr);
        pkt[16..20].copy_from_slice(&daddr);
        pkt[20..22].copy_from_slice(&sport.to_be_bytes());
        pkt[22..24].copy_from_slice(&dport.to_be_bytes());
        pkt
    }

    /// Builds a TCP/IPv4 packet between two fixed hosts.
    pub fn tcp_packet(sport: u16, dport: u16) -> Vec<u8> {
        ipv4_packet(IPPROTO_TCP, [10, 0, 0, 1], [10, 0, 0, 2], sport, dport)
    }
}
