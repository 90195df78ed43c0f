//! Filter descriptors and installed filters.
//!
//! A [`FilterDescriptor`] is what the control plane hands in; installing it
//! resolves interface names and yields an immutable [`Filter`] that the
//! interception path matches packets against.

use crate::error::Result;
use crate::network::core::device::{DeviceRef, NetDevice};
use crate::network::core::headers::PacketHeaders;
use crate::network::filter::point::InterceptionPoint;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

bitflags! {
    /// Match dimensions a filter checks. Unset dimensions always match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MatchMask: u32 {
        const PROTO = 1 << 0;
        const OUT = 1 << 1;
        const IN = 1 << 2;
        const SADDR = 1 << 3;
        const DADDR = 1 << 4;
        const SPORT = 1 << 5;
        const DPORT = 1 << 6;
    }
}

/// Match criteria as requested by a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Raw interception point number, validated on install
    pub hooknum: i32,
    /// Hook priority, used only when the point's hook is first installed
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_dev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saddr: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daddr: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dport: Option<u16>,
}

impl FilterDescriptor {
    /// Starts a descriptor for `point` with every dimension unset.
    pub fn at(point: InterceptionPoint) -> Self {
        Self {
            hooknum: point.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn proto(mut self, proto: u8) -> Self {
        self.proto = Some(proto);
        self
    }

    pub fn in_dev(mut self, name: impl Into<String>) -> Self {
        self.in_dev = Some(name.into());
        self
    }

    pub fn out_dev(mut self, name: impl Into<String>) -> Self {
        self.out_dev = Some(name.into());
        self
    }

    pub fn saddr(mut self, addr: Ipv4Addr) -> Self {
        self.saddr = Some(addr);
        self
    }

    pub fn daddr(mut self, addr: Ipv4Addr) -> Self {
        self.daddr = Some(addr);
        self
    }

    pub fn sport(mut self, port: u16) -> Self {
        self.sport = Some(port);
        self
    }

    pub fn dport(mut self, port: u16) -> Self {
        self.dport = Some(port);
        self
    }
}

/// An installed filter. Immutable once built.
#[derive(Debug, Clone)]
pub struct Filter {
    point: InterceptionPoint,
    priority: i32,
    mask: MatchMask,
    proto: u8,
    in_dev: Option<DeviceRef>,
    out_dev: Option<DeviceRef>,
    saddr: Ipv4Addr,
    daddr: Ipv4Addr,
    sport: u16,
    dport: u16,
}

impl Filter {
    /// Validates `desc` and resolves its interface names with `resolve`.
    ///
    /// An interface name that does not resolve leaves that dimension unset
    /// rather than failing the install.
    pub fn resolve<F>(desc: &FilterDescriptor, resolve: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<DeviceRef>,
    {
        let point = InterceptionPoint::try_from(desc.hooknum)?;
        let in_dev = desc.in_dev.as_deref().and_then(&resolve);
        let out_dev = desc.out_dev.as_deref().and_then(&resolve);

        let mut mask = MatchMask::empty();
        mask.set(MatchMask::PROTO, desc.proto.is_some());
        mask.set(MatchMask::IN, in_dev.is_some());
        mask.set(MatchMask::OUT, out_dev.is_some());
        mask.set(MatchMask::SADDR, desc.saddr.is_some());
        mask.set(MatchMask::DADDR, desc.daddr.is_some());
        mask.set(MatchMask::SPORT, desc.sport.is_some());
        mask.set(MatchMask::DPORT, desc.dport.is_some());

        Ok(Self {
            point,
            priority: desc.priority,
            mask,
            proto: desc.proto.unwrap_or_default(),
            in_dev,
            out_dev,
            saddr: desc.saddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            daddr: desc.daddr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            sport: desc.sport.unwrap_or_default(),
            dport: desc.dport.unwrap_or_default(),
        })
    }

    pub fn point(&self) -> InterceptionPoint {
        self.point
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn mask(&self) -> MatchMask {
        self.mask
    }

    pub fn in_dev(&self) -> Option<&DeviceRef> {
        self.in_dev.as_ref()
    }

    pub fn out_dev(&self) -> Option<&DeviceRef> {
        self.out_dev.as_ref()
    }

    /// Checks a packet seen at `point` against this filter.
    ///
    /// Protocol and address dimensions are only checked when the packet has a
    /// network header, port dimensions only when it has a transport header.
    pub fn matches(
        &self,
        point: InterceptionPoint,
        headers: &PacketHeaders,
        in_dev: Option<&NetDevice>,
        out_dev: Option<&NetDevice>,
    ) -> bool {
        if self.point != point {
            return false;
        }
        if self.mask.contains(MatchMask::OUT) && !same_device(self.out_dev.as_deref(), out_dev) {
            return false;
        }
        if self.mask.contains(MatchMask::IN) && !same_device(self.in_dev.as_deref(), in_dev) {
            return false;
        }

        if let Some(net) = &headers.network {
            if self.mask.contains(MatchMask::PROTO) && self.proto != net.protocol {
                return false;
            }
            if self.mask.contains(MatchMask::SADDR) && self.saddr != net.saddr {
                return false;
            }
            if self.mask.contains(MatchMask::DADDR) && self.daddr != net.daddr {
                return false;
            }
        }

        if let Some(ports) = &headers.transport {
            if self.mask.contains(MatchMask::SPORT) && self.sport != ports.source {
                return false;
            }
            if self.mask.contains(MatchMask::DPORT) && self.dport != ports.dest {
                return false;
            }
        }

        true
    }
}

fn same_device(a: Option<&NetDevice>, b: Option<&NetDevice>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is(b),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.point)?;
        if self.mask.contains(MatchMask::PROTO) {
            write!(f, " proto={}", self.proto)?;
        }
        if let Some(dev) = &self.in_dev {
            write!(f, " in={}", dev.name())?;
        }
        if let Some(dev) = &self.out_dev {
            write!(f, " out={}", dev.name())?;
        }
        if self.mask.contains(MatchMask::SADDR) {
            write!(f, " saddr={}", self.saddr)?;
        }
        if self.mask.contains(MatchMask::DADDR) {
            write!(f, " daddr={}", self.daddr)?;
        }
        if self.mask.contains(MatchMask::SPORT) {
            write!(f, " sport={}", self.sport)?;
        }
        if self.mask.contains(MatchMask::DPORT) {
            write!(f, " dport={}", self.dport)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetHookError;
    use crate::network::core::device::MacAddr;
    use crate::network::core::headers::testing::{ipv4_packet, tcp_packet};
    use crate::network::core::headers::{ETH_P_ARP, ETH_P_IP, IPPROTO_ICMP, IPPROTO_TCP};
    use std::sync::Arc;

    fn no_devices(_: &str) -> Option<DeviceRef> {
        None
    }

    fn tcp(sport: u16, dport: u16) -> PacketHeaders {
        PacketHeaders::parse(ETH_P_IP, &tcp_packet(sport, dport))
    }

    #[test]
    fn test_invalid_point() {
        let desc = FilterDescriptor {
            hooknum: 5,
            ..Default::default()
        };
        assert!(matches!(
            Filter::resolve(&desc, no_devices),
            Err(NetHookError::InvalidPoint(5))
        ));
    }

    #[test]
    fn test_mask_follows_present_fields() {
        let desc = FilterDescriptor::at(InterceptionPoint::Forward)
            .proto(IPPROTO_TCP)
            .dport(443)
            .in_dev("missing0");
        let filter = Filter::resolve(&desc, no_devices).unwrap();
        assert_eq!(filter.mask(), MatchMask::PROTO | MatchMask::DPORT);
        assert!(filter.in_dev().is_none());
    }

    #[test]
    fn test_dport_filter() {
        let desc = FilterDescriptor::at(InterceptionPoint::PostRouting).dport(80);
        let filter = Filter::resolve(&desc, no_devices).unwrap();

        assert!(filter.matches(InterceptionPoint::PostRouting, &tcp(1234, 80), None, None));
        assert!(!filter.matches(InterceptionPoint::PostRouting, &tcp(1234, 443), None, None));
        assert!(!filter.matches(InterceptionPoint::PreRouting, &tcp(1234, 80), None, None));
    }

    #[test]
    fn test_dport_only_skips_missing_transport() {
        let desc = FilterDescriptor::at(InterceptionPoint::LocalIn).dport(80);
        let filter = Filter::resolve(&desc, no_devices).unwrap();

        let icmp = ipv4_packet(IPPROTO_ICMP, [1, 1, 1, 1], [2, 2, 2, 2], 0, 0);
        let headers = PacketHeaders::parse(ETH_P_IP, &icmp);
        assert!(filter.matches(InterceptionPoint::LocalIn, &headers, None, None));

        let arp = PacketHeaders::parse(ETH_P_ARP, &[0u8; 28]);
        assert!(filter.matches(InterceptionPoint::LocalIn, &arp, None, None));
    }

    #[test]
    fn test_address_and_protocol() {
        let desc = FilterDescriptor::at(InterceptionPoint::Forward)
            .proto(IPPROTO_TCP)
            .saddr(Ipv4Addr::new(10, 0, 0, 1))
            .daddr(Ipv4Addr::new(10, 0, 0, 2));
        let filter = Filter::resolve(&desc, no_devices).unwrap();
        assert!(filter.matches(InterceptionPoint::Forward, &tcp(1, 2), None, None));

        let other = ipv4_packet(IPPROTO_TCP, [10, 0, 0, 9], [10, 0, 0, 2], 1, 2);
        let headers = PacketHeaders::parse(ETH_P_IP, &other);
        assert!(!filter.matches(InterceptionPoint::Forward, &headers, None, None));

        let icmp = ipv4_packet(IPPROTO_ICMP, [10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        let headers = PacketHeaders::parse(ETH_P_IP, &icmp);
        assert!(!filter.matches(InterceptionPoint::Forward, &headers, None, None));
    }

    #[test]
    fn test_interface_dimensions() {
        let eth0 = Arc::new(NetDevice::new("eth0", 1, MacAddr::ZERO));
        let eth1 = Arc::new(NetDevice::new("eth1", 2, MacAddr::ZERO));
        let lookup = |name: &str| match name {
            "eth0" => Some(Arc::clone(&eth0)),
            "eth1" => Some(Arc::clone(&eth1)),
            _ => None,
        };

        let desc = FilterDescriptor::at(InterceptionPoint::Forward)
            .in_dev("eth0")
            .out_dev("eth1");
        let filter = Filter::resolve(&desc, lookup).unwrap();
        assert_eq!(filter.mask(), MatchMask::IN | MatchMask::OUT);

        let headers = tcp(1, 2);
        let point = InterceptionPoint::Forward;
        assert!(filter.matches(point, &headers, Some(&*eth0), Some(&*eth1)));
        assert!(!filter.matches(point, &headers, Some(&*eth1), Some(&*eth1)));
        assert!(!filter.matches(point, &headers, Some(&*eth0), None));
    }

    #[test]
    fn test_display() {
        let desc = FilterDescriptor::at(InterceptionPoint::PostRouting)
            .proto(IPPROTO_TCP)
            .dport(80);
        let filter = Filter::resolve(&desc, no_devices).unwrap();
        assert_eq!(filter.to_string(), "post_routing proto=6 dport=80");
    }
}
