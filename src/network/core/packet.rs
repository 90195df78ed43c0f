use crate::error::{NetHookError, Result};
use crate::network::core::device::{DeviceRef, MacAddr};
use crate::network::core::headers::{
    classify_frame, protocol_of, EthHeader, PacketHeaders, PacketType, ETH_HLEN,
};
use crate::network::processing::loop_guard::LoopToken;
use std::fmt;

/// Alignment pad reserved in front of freshly allocated buffers, so that the
/// network header following a link header lands on a 4-byte boundary.
pub const NET_IP_ALIGN: usize = 2;

/// Headroom reserved in front of network-layer packets for a link header.
pub const LINK_HEADROOM: usize = NET_IP_ALIGN + ETH_HLEN;

/// An owned packet buffer together with the metadata the host tracks for it.
///
/// `PacketBuf` is deliberately not `Clone`: every stage that ends a packet's
/// life (passthrough back to the host, enqueue, delivery to a reader,
/// reinjection, drain on close) takes it by value, and dropping it is the one
/// and only release.
pub struct PacketBuf {
    buf: Vec<u8>,
    head: usize,
    mac_header: Option<usize>,
    dev: Option<DeviceRef>,
    protocol: u16,
    pkt_type: PacketType,
    neighbour: Option<MacAddr>,
    loop_token: Option<LoopToken>,
}

impl PacketBuf {
    /// Allocates a buffer holding `data` preceded by `headroom` bytes.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn try_with_headroom(headroom: usize, data: &[u8]) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(headroom + data.len())
            .map_err(|_| NetHookError::OutOfMemory("packet buffer"))?;
        buf.resize(headroom, 0);
        buf.extend_from_slice(data);

        Ok(Self {
            buf,
            head: headroom,
            mac_header: None,
            dev: None,
            protocol: 0,
            pkt_type: PacketType::default(),
            neighbour: None,
            loop_token: None,
        })
    }

    /// Builds a packet whose data starts at the network header, as it appears
    /// at an interception point. The link-layer protocol is guessed from the
    /// IP version nibble.
    pub fn from_network(data: &[u8]) -> Result<Self> {
        let mut packet = Self::try_with_headroom(LINK_HEADROOM, data)?;
        packet.protocol = protocol_of(data);
        Ok(packet)
    }

    /// Builds a packet received as a full Ethernet frame on `dev`.
    ///
    /// The link header stays in the headroom as the recorded MAC header and
    /// the data starts at the network header.
    pub fn from_frame(frame: &[u8], dev: DeviceRef) -> Result<Self> {
        let mut packet = Self::try_with_headroom(NET_IP_ALIGN, frame)?;
        packet.set_dev(dev);
        packet.eth_type_trans()?;
        Ok(packet)
    }

    /// Packet bytes from the current data pointer.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Moves the data pointer back by `n` bytes, growing the headroom if needed.
    pub fn push(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.head < n {
            self.expand_head(n - self.head)?;
        }
        self.head -= n;
        Ok(&mut self.buf[self.head..self.head + n])
    }

    /// Moves the data pointer forward by `n` bytes, returning what was skipped.
    pub fn pull(&mut self, n: usize) -> Option<&[u8]> {
        if self.len() < n {
            return None;
        }
        let start = self.head;
        self.head += n;
        Some(&self.buf[start..start + n])
    }

    fn expand_head(&mut self, extra: usize) -> Result<()> {
        let mut grown = Vec::new();
        grown
            .try_reserve_exact(self.buf.len() + extra)
            .map_err(|_| NetHookError::OutOfMemory("packet headroom"))?;
        grown.resize(extra, 0);
        grown.extend_from_slice(&self.buf);
        self.buf = grown;
        self.head += extra;
        if let Some(mac) = self.mac_header.as_mut() {
            *mac += extra;
        }
        Ok(())
    }

    /// Records the current data pointer as the start of the link header.
    pub fn reset_mac_header(&mut self) {
        self.mac_header = Some(self.head);
    }

    /// The recorded link header, if one sits fully in front of the data.
    pub fn mac_header(&self) -> Option<&[u8]> {
        let start = self.mac_header?;
        if start + ETH_HLEN > self.head {
            return None;
        }
        self.buf.get(start..start + ETH_HLEN)
    }

    /// Sets the device from the frame, records and pulls the link header and
    /// derives protocol and packet type from it.
    pub fn eth_type_trans(&mut self) -> Result<()> {
        let len = self.len();
        let header = EthHeader::parse(self.data()).ok_or(NetHookError::FrameTooShort(len))?;
        let dev = self
            .dev
            .clone()
            .ok_or(NetHookError::BadState("packet has no device"))?;

        self.reset_mac_header();
        self.pull(ETH_HLEN);
        let (protocol, pkt_type) = classify_frame(&header, self.data(), &dev);
        self.protocol = protocol;
        self.pkt_type = pkt_type;
        Ok(())
    }

    /// Headers parsed from the current data pointer.
    pub fn headers(&self) -> PacketHeaders {
        PacketHeaders::parse(self.protocol, self.data())
    }

    pub fn dev(&self) -> Option<&DeviceRef> {
        self.dev.as_ref()
    }

    pub fn set_dev(&mut self, dev: DeviceRef) {
        self.dev = Some(dev);
    }

    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: u16) {
        self.protocol = protocol;
    }

    pub fn pkt_type(&self) -> PacketType {
        self.pkt_type
    }

    pub fn set_pkt_type(&mut self, pkt_type: PacketType) {
        self.pkt_type = pkt_type;
    }

    /// Hardware address of the already-resolved next hop, if any.
    pub fn neighbour(&self) -> Option<MacAddr> {
        self.neighbour
    }

    pub fn set_neighbour(&mut self, neighbour: MacAddr) {
        self.neighbour = Some(neighbour);
    }

    pub(crate) fn attach_loop_token(&mut self, token: LoopToken) {
        self.loop_token = Some(token);
    }

    pub(crate) fn take_loop_token(&mut self) -> Option<LoopToken> {
        self.loop_token.take()
    }

    /// Whether this packet carries a reinjection mark.
    pub fn is_reinjected(&self) -> bool {
        self.loop_token.is_some()
    }

    /// Puts a link header in front of the network data, as a reader expects it.
    ///
    /// A link header the host recorded is reused; otherwise one is built from
    /// the packet's device address and protocol. Either way the destination
    /// is re-derived from the resolved next hop when there is one, because
    /// the forwarding path strips it before the interception point.
    pub fn restore_link_header(&mut self) -> Result<()> {
        let recorded = self.mac_header().and_then(EthHeader::parse);
        let mut header = recorded.unwrap_or_else(|| EthHeader {
            dest: MacAddr::ZERO,
            source: self.dev.as_ref().map(|d| d.hw_addr()).unwrap_or_default(),
            ethertype: self.protocol,
        });
        if let Some(neighbour) = self.neighbour {
            header.dest = neighbour;
        }

        let slot = self.push(ETH_HLEN)?;
        header.write(slot);
        self.reset_mac_header();
        Ok(())
    }
}

impl fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuf")
            .field("len", &self.len())
            .field("headroom", &self.head)
            .field("protocol", &format_args!("{:#06x}", self.protocol))
            .field("dev", &self.dev.as_ref().map(|d| d.name().to_string()))
            .field("neighbour", &self.neighbour)
            .field("reinjected", &self.loop_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::core::device::NetDevice;
    use crate::network::core::headers::testing::tcp_packet;
    use crate::network::core::headers::{ETH_P_IP, IPPROTO_TCP};
    use std::sync::Arc;

    fn eth0() -> DeviceRef {
        Arc::new(NetDevice::new("eth0", 2, "02:00:00:00:00:01".parse().unwrap()))
    }

    fn frame(dest: MacAddr, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HLEN];
        EthHeader {
            dest,
            source: "02:00:00:00:00:aa".parse().unwrap(),
            ethertype: ETH_P_IP,
        }
        .write(&mut frame);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_from_network() {
        let ip = tcp_packet(1000, 80);
        let packet = PacketBuf::from_network(&ip).unwrap();
        assert_eq!(packet.data(), &ip[..]);
        assert_eq!(packet.headroom(), LINK_HEADROOM);
        assert_eq!(packet.protocol(), ETH_P_IP);
        assert_eq!(packet.headers().network.unwrap().protocol, IPPROTO_TCP);
    }

    #[test]
    fn test_push_pull() {
        let mut packet = PacketBuf::try_with_headroom(4, &[1, 2, 3]).unwrap();
        assert_eq!(packet.pull(1), Some(&[1u8][..]));
        assert_eq!(packet.data(), &[2, 3]);
        assert!(packet.pull(3).is_none());

        packet.push(2).unwrap().copy_from_slice(&[8, 9]);
        assert_eq!(packet.data(), &[8, 9, 2, 3]);
        assert_eq!(packet.headroom(), 3);
    }

    #[test]
    fn test_push_grows_headroom() {
        let mut packet = PacketBuf::try_with_headroom(0, &[5, 6]).unwrap();
        packet.push(ETH_HLEN).unwrap().fill(0xee);
        assert_eq!(packet.len(), ETH_HLEN + 2);
        assert_eq!(&packet.data()[ETH_HLEN..], &[5, 6]);
    }

    #[test]
    fn test_from_frame_records_mac_header() {
        let dev = eth0();
        let ip = tcp_packet(1000, 80);
        let raw = frame(dev.hw_addr(), &ip);

        let packet = PacketBuf::from_frame(&raw, dev).unwrap();
        assert_eq!(packet.data(), &ip[..]);
        assert_eq!(packet.protocol(), ETH_P_IP);
        assert_eq!(packet.pkt_type(), PacketType::Host);
        assert_eq!(packet.mac_header(), Some(&raw[..ETH_HLEN]));
    }

    #[test]
    fn test_from_frame_too_short() {
        let err = PacketBuf::from_frame(&[0u8; 6], eth0()).unwrap_err();
        assert!(matches!(err, NetHookError::FrameTooShort(6)));
    }

    #[test]
    fn test_restore_recorded_header_with_neighbour() {
        let dev = eth0();
        let ip = tcp_packet(1000, 80);
        let raw = frame(dev.hw_addr(), &ip);
        let next_hop: MacAddr = "02:00:00:00:00:77".parse().unwrap();

        let mut packet = PacketBuf::from_frame(&raw, dev).unwrap();
        packet.set_neighbour(next_hop);
        packet.restore_link_header().unwrap();

        let header = EthHeader::parse(packet.data()).unwrap();
        assert_eq!(header.dest, next_hop);
        assert_eq!(header.source, "02:00:00:00:00:aa".parse().unwrap());
        assert_eq!(&packet.data()[ETH_HLEN..], &ip[..]);
    }

    #[test]
    fn test_restore_synthesised_header() {
        let ip = tcp_packet(1000, 80);
        let mut packet = PacketBuf::from_network(&ip).unwrap();
        packet.set_dev(eth0());
        packet.restore_link_header().unwrap();

        let header = EthHeader::parse(packet.data()).unwrap();
        assert_eq!(header.dest, MacAddr::ZERO);
        assert_eq!(header.source, "02:00:00:00:00:01".parse().unwrap());
        assert_eq!(header.ethertype, ETH_P_IP);
        assert_eq!(packet.len(), ETH_HLEN + ip.len());
    }
}
