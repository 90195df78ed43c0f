//! Network interface identities.
//!
//! Interfaces are owned by the host; filters and writers hold counted
//! references (`DeviceRef`) for as long as they need them, mirroring the
//! hold/release discipline of a kernel device table.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Length of an Ethernet hardware address.
pub const ETH_ALEN: usize = 6;

/// Error returned when a hardware address string cannot be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid hardware address")]
pub struct MacAddrParseError(String);

/// An Ethernet hardware address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    /// The all-zero placeholder address.
    pub const ZERO: MacAddr = MacAddr([0; ETH_ALEN]);
    /// The Ethernet broadcast address.
    pub const BROADCAST: MacAddr = MacAddr([0xff; ETH_ALEN]);

    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set (includes broadcast).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Reads an address from the first six bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; ETH_ALEN] = bytes.get(..ETH_ALEN)?.try_into().ok()?;
        Some(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ETH_ALEN];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| MacAddrParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(MacAddrParseError(s.to_string()));
            }
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| MacAddrParseError(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(MacAddrParseError(s.to_string()));
        }

        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A network interface known to the host.
#[derive(Debug, PartialEq, Eq)]
pub struct NetDevice {
    name: String,
    ifindex: u32,
    hw_addr: MacAddr,
}

/// Counted reference to a live interface.
///
/// Dropping the last reference is the equivalent of releasing the device.
pub type DeviceRef = Arc<NetDevice>;

impl NetDevice {
    pub fn new(name: impl Into<String>, ifindex: u32, hw_addr: MacAddr) -> Self {
        Self {
            name: name.into(),
            ifindex,
            hw_addr,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn hw_addr(&self) -> MacAddr {
        self.hw_addr
    }

    /// Interface identity comparison; two handles to the same interface are equal.
    pub fn is(&self, other: &NetDevice) -> bool {
        self.ifindex == other.ifindex
    }
}

impl fmt::Display for NetDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.ifindex)
    }
}
