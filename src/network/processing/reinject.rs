//! Reinjection of subscriber-written frames.
//!
//! A subscriber writes a complete Ethernet frame. Depending on its write
//! mode the frame is handed to the host ingress path (after being marked so
//! the interception callback lets it through), straight to the interface
//! driver, or to the interface's outbound queue.

use crate::error::{NetHookError, Result};
use crate::network::core::device::DeviceRef;
use crate::network::core::headers::{EthHeader, PacketType, ETH_HLEN, ETH_P_IP};
use crate::network::core::host::PacketHost;
use crate::network::core::packet::{PacketBuf, NET_IP_ALIGN};
use crate::network::processing::loop_guard::LoopGuard;
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where written frames are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Back into the forwarding stack, as if received on the destination interface
    #[default]
    ToStack,
    /// Directly to the destination interface's driver
    ToInterface,
    /// Through the destination interface's outbound queue
    ToInterfaceQueue,
}

impl WriteMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::ToStack => "to_stack",
            Self::ToInterface => "to_interface",
            Self::ToInterfaceQueue => "to_interface_queue",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write configuration as requested by a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterDescriptor {
    pub dest_dev: String,
    #[serde(default)]
    pub mode: WriteMode,
}

impl WriterDescriptor {
    pub fn new(dest_dev: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            dest_dev: dest_dev.into(),
            mode,
        }
    }
}

/// An attached write configuration.
///
/// The destination is resolved once and held for the writer's lifetime. A
/// name that did not resolve is kept as "no destination" and makes every
/// write fail.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    dest_name: String,
    dest: Option<DeviceRef>,
    mode: WriteMode,
}

impl WriterConfig {
    pub fn resolve<F>(desc: &WriterDescriptor, resolve: F) -> Self
    where
        F: Fn(&str) -> Option<DeviceRef>,
    {
        Self {
            dest_name: desc.dest_dev.clone(),
            dest: resolve(&desc.dest_dev),
            mode: desc.mode,
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn dest(&self) -> Option<&DeviceRef> {
        self.dest.as_ref()
    }

    pub fn dest_name(&self) -> &str {
        &self.dest_name
    }
}

/// Drives written frames into one of the three re-entry paths.
pub struct Reinjector<'a> {
    host: &'a dyn PacketHost,
    loop_guard: &'a LoopGuard,
}

impl<'a> Reinjector<'a> {
    pub fn new(host: &'a dyn PacketHost, loop_guard: &'a LoopGuard) -> Self {
        Self { host, loop_guard }
    }

    /// Copies `frame` into a fresh buffer and reinjects it according to
    /// `writer`, returning the number of bytes accepted.
    ///
    /// The buffer is released on every error path.
    pub fn inject(&self, writer: &WriterConfig, frame: &[u8]) -> Result<usize> {
        let dest = writer
            .dest
            .clone()
            .ok_or_else(|| NetHookError::ResolutionFailed(writer.dest_name.clone()))?;
        if frame.len() < ETH_HLEN {
            return Err(NetHookError::FrameTooShort(frame.len()));
        }

        let mut packet = PacketBuf::try_with_headroom(NET_IP_ALIGN, frame)?;
        packet.set_dev(dest.clone());

        match writer.mode {
            WriteMode::ToStack => {
                packet.attach_loop_token(self.loop_guard.mark());
                packet.eth_type_trans()?;
                trace!("Reinjecting {:?} into the stack via {}", packet, dest);
                self.host.receive(packet)?;
            }
            WriteMode::ToInterface => {
                rebuild_link_header(&mut packet, &dest)?;
                trace!("Transmitting {:?} directly on {}", packet, dest);
                self.host.transmit_raw(&dest, packet)?;
            }
            WriteMode::ToInterfaceQueue => {
                rebuild_link_header(&mut packet, &dest)?;
                trace!("Queueing {:?} for transmit on {}", packet, dest);
                self.host.transmit_queued(packet)?;
            }
        }

        Ok(frame.len())
    }
}

/// Replaces the caller's link header with one sourced from `dev`.
///
/// No address resolution happens here: the destination bytes the caller put
/// in the frame are carried over, the source becomes the interface address
/// and the ethertype IPv4.
fn rebuild_link_header(packet: &mut PacketBuf, dev: &DeviceRef) -> Result<()> {
    let len = packet.len();
    let caller = EthHeader::parse(packet.data()).ok_or(NetHookError::FrameTooShort(len))?;
    packet.pull(ETH_HLEN);
    packet.set_protocol(ETH_P_IP);

    let header = EthHeader {
        dest: caller.dest,
        source: dev.hw_addr(),
        ethertype: ETH_P_IP,
    };
    header.write(packet.push(ETH_HLEN)?);
    packet.reset_mac_header();
    packet.set_pkt_type(PacketType::Outgoing);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::core::device::MacAddr;
    use crate::network::core::headers::testing::tcp_packet;
    use crate::network::core::memory_host::{CapturePath, MemoryHost};

    fn frame(dest: MacAddr, source: MacAddr) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HLEN];
        EthHeader {
            dest,
            source,
            ethertype: ETH_P_IP,
        }
        .write(&mut frame);
        frame.extend_from_slice(&tcp_packet(1000, 80));
        frame
    }

    fn setup() -> (MemoryHost, DeviceRef, LoopGuard) {
        let host = MemoryHost::new();
        let dev = host.add_device("eth0", "02:00:00:00:00:01".parse().unwrap());
        (host, dev, LoopGuard::new())
    }

    fn writer(host: &MemoryHost, name: &str, mode: WriteMode) -> WriterConfig {
        WriterConfig::resolve(&WriterDescriptor::new(name, mode), |n| host.device_by_name(n))
    }

    #[test]
    fn test_to_stack_marks_packet() {
        let (host, dev, guard) = setup();
        let writer = writer(&host, "eth0", WriteMode::ToStack);
        let raw = frame(dev.hw_addr(), "02:00:00:00:00:02".parse().unwrap());

        let written = Reinjector::new(&host, &guard).inject(&writer, &raw).unwrap();
        assert_eq!(written, raw.len());
        assert_eq!(guard.outstanding(), 1);

        let received = host.take_received();
        assert_eq!(received.len(), 1);
        let packet = &received[0];
        assert!(packet.is_reinjected());
        assert_eq!(packet.protocol(), ETH_P_IP);
        assert_eq!(packet.pkt_type(), PacketType::Host);
        assert_eq!(packet.data(), &raw[ETH_HLEN..]);
        assert!(packet.dev().unwrap().is(&dev));

        drop(received);
        assert_eq!(guard.outstanding(), 0);
    }

    #[test]
    fn test_to_interface_rebuilds_header() {
        let (host, dev, guard) = setup();
        let writer = writer(&host, "eth0", WriteMode::ToInterface);
        let next_hop: MacAddr = "02:00:00:00:00:99".parse().unwrap();
        let raw = frame(next_hop, "0a:0a:0a:0a:0a:0a".parse().unwrap());

        Reinjector::new(&host, &guard).inject(&writer, &raw).unwrap();
        assert_eq!(guard.outstanding(), 0);

        let captured = host.take_captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].path, CapturePath::RawTransmit);

        let header = EthHeader::parse(captured[0].packet.data()).unwrap();
        assert_eq!(header.dest, next_hop);
        assert_eq!(header.source, dev.hw_addr());
        assert_eq!(header.ethertype, ETH_P_IP);
        assert_eq!(&captured[0].packet.data()[ETH_HLEN..], &raw[ETH_HLEN..]);
    }

    #[test]
    fn test_to_interface_busy() {
        let (host, dev, guard) = setup();
        let writer = writer(&host, "eth0", WriteMode::ToInterface);
        let raw = frame(MacAddr::BROADCAST, MacAddr::ZERO);

        let hold = host.hold_xmit_lock(&dev).unwrap();
        let result = hold.with(|| Reinjector::new(&host, &guard).inject(&writer, &raw));
        assert!(matches!(result, Err(NetHookError::DeviceBusy(_))));
        assert!(host.take_captured().is_empty());
    }

    #[test]
    fn test_to_interface_queue_backpressure() {
        let (host, dev, guard) = setup();
        let writer = writer(&host, "eth0", WriteMode::ToInterfaceQueue);
        let raw = frame(MacAddr::BROADCAST, MacAddr::ZERO);
        let reinjector = Reinjector::new(&host, &guard);

        reinjector.inject(&writer, &raw).unwrap();
        assert_eq!(host.take_captured()[0].path, CapturePath::QueuedTransmit);

        host.set_queue_stopped(&dev, true);
        assert!(matches!(
            reinjector.inject(&writer, &raw),
            Err(NetHookError::DeviceBusy(_))
        ));
    }

    #[test]
    fn test_unresolved_destination_fails_at_inject() {
        let (host, _dev, guard) = setup();
        let writer = writer(&host, "wlan7", WriteMode::ToStack);
        assert!(writer.dest().is_none());

        let raw = frame(MacAddr::BROADCAST, MacAddr::ZERO);
        let err = Reinjector::new(&host, &guard).inject(&writer, &raw).unwrap_err();
        assert!(matches!(err, NetHookError::ResolutionFailed(name) if name == "wlan7"));
        assert_eq!(guard.outstanding(), 0);
    }

    #[test]
    fn test_short_frame_rejected() {
        let (host, _dev, guard) = setup();
        let writer = writer(&host, "eth0", WriteMode::ToStack);
        let err = Reinjector::new(&host, &guard)
            .inject(&writer, &[0u8; 10])
            .unwrap_err();
        assert!(matches!(err, NetHookError::FrameTooShort(10)));
        assert_eq!(guard.outstanding(), 0);
    }

    #[test]
    fn test_write_mode_names() {
        assert_eq!(WriteMode::default(), WriteMode::ToStack);
        assert_eq!(WriteMode::ToInterfaceQueue.to_string(), "to_interface_queue");
    }
}
