//! The contract with the host forwarding engine.
//!
//! Everything outside the interception core (device lookup, hook
//! installation, the ingress path and the two transmit paths) is reached
//! through [`PacketHost`], so the core can be driven by a real data path or
//! by the in-memory host used in tests.

use crate::error::Result;
use crate::network::core::device::{DeviceRef, NetDevice};
use crate::network::core::packet::PacketBuf;
use crate::network::filter::InterceptionPoint;

/// Services the host forwarding engine provides to the interception core.
pub trait PacketHost: Send + Sync {
    /// Looks up a live interface by name, returning a held reference.
    fn device_by_name(&self, name: &str) -> Option<DeviceRef>;

    /// Installs the low-level hook for `point`. Called at most once per point
    /// until [`PacketHost::unregister_hook`] is called for it.
    fn register_hook(&self, point: InterceptionPoint, priority: i32) -> Result<()>;

    /// Removes the hook installed for `point`.
    fn unregister_hook(&self, point: InterceptionPoint);

    /// Submits a packet to the ingress path, as if it had just been received
    /// on its device. The host may run interception synchronously from here.
    fn receive(&self, packet: PacketBuf) -> Result<()>;

    /// Hands a complete frame straight to `dev`'s driver, bypassing the
    /// outbound queue.
    ///
    /// The host serialises calls per interface: while one transmit is in
    /// flight on `dev`, others fail with `DeviceBusy` instead of waiting.
    fn transmit_raw(&self, dev: &NetDevice, packet: PacketBuf) -> Result<()>;

    /// Submits a complete frame to its device's outbound queue, subject to the
    /// queue's own backpressure.
    fn transmit_queued(&self, packet: PacketBuf) -> Result<()>;
}
