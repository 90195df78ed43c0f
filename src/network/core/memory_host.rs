//! An in-memory [`PacketHost`].
//!
//! Keeps a device table, records hook registrations and captures everything
//! submitted to the ingress and transmit paths so callers can inspect or
//! re-drive it. Raw transmits are serialised per interface the way a driver
//! transmit lock would be.

use crate::error::{NetHookError, Result};
use crate::network::core::device::{DeviceRef, MacAddr, NetDevice};
use crate::network::core::host::PacketHost;
use crate::network::core::packet::PacketBuf;
use crate::network::filter::InterceptionPoint;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which path a captured packet left through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePath {
    Ingress,
    RawTransmit,
    QueuedTransmit,
}

/// A packet captured by the host together with the path it took.
#[derive(Debug)]
pub struct Captured {
    pub path: CapturePath,
    pub packet: PacketBuf,
}

#[derive(Default)]
struct Port {
    xmit_lock: Arc<Mutex<()>>,
    queue_stopped: bool,
    down: bool,
}

#[derive(Default)]
struct HostState {
    devices: HashMap<String, DeviceRef>,
    ports: HashMap<u32, Port>,
    hooks: HashMap<InterceptionPoint, i32>,
    refused_hooks: HashSet<InterceptionPoint>,
    registrations: usize,
    captured: Vec<Captured>,
    last_ifindex: u32,
}

/// Host forwarding engine simulated in memory.
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an interface, returning a reference to it.
    pub fn add_device(&self, name: &str, hw_addr: MacAddr) -> DeviceRef {
        let mut state = self.state();
        state.last_ifindex += 1;
        let ifindex = state.last_ifindex;
        let dev = Arc::new(NetDevice::new(name, ifindex, hw_addr));
        state.devices.insert(name.to_string(), Arc::clone(&dev));
        state.ports.insert(ifindex, Port::default());
        debug!("Added device {}", dev);
        dev
    }

    /// Removes an interface from the table; held references stay valid.
    pub fn remove_device(&self, name: &str) -> Option<DeviceRef> {
        let mut state = self.state();
        let dev = state.devices.remove(name)?;
        state.ports.remove(&dev.ifindex());
        Some(dev)
    }

    /// Stops or wakes an interface's outbound queue.
    pub fn set_queue_stopped(&self, dev: &NetDevice, stopped: bool) {
        if let Some(port) = self.state().ports.get_mut(&dev.ifindex()) {
            port.queue_stopped = stopped;
        }
    }

    /// Takes an interface administratively down or up.
    pub fn set_down(&self, dev: &NetDevice, down: bool) {
        if let Some(port) = self.state().ports.get_mut(&dev.ifindex()) {
            port.down = down;
        }
    }

    /// Makes future registrations at `point` fail.
    pub fn refuse_hook(&self, point: InterceptionPoint) {
        self.state().refused_hooks.insert(point);
    }

    /// Holds `dev`'s transmit lock until the returned guard is dropped.
    pub fn hold_xmit_lock(&self, dev: &NetDevice) -> Option<XmitLockHold> {
        let lock = Arc::clone(&self.state().ports.get(&dev.ifindex())?.xmit_lock);
        Some(XmitLockHold { lock })
    }

    /// Points with a hook currently installed, with their priorities.
    pub fn active_hooks(&self) -> Vec<(InterceptionPoint, i32)> {
        let mut hooks: Vec<_> = self.state().hooks.iter().map(|(p, prio)| (*p, *prio)).collect();
        hooks.sort_by_key(|(p, _)| *p);
        hooks
    }

    /// Total number of successful hook registrations ever made.
    pub fn registration_count(&self) -> usize {
        self.state().registrations
    }

    /// Removes and returns everything captured so far.
    pub fn take_captured(&self) -> Vec<Captured> {
        std::mem::take(&mut self.state().captured)
    }

    /// Removes and returns the packets submitted to the ingress path.
    pub fn take_received(&self) -> Vec<PacketBuf> {
        let mut state = self.state();
        let (received, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.captured)
            .into_iter()
            .partition(|c| c.path == CapturePath::Ingress);
        state.captured = rest;
        received.into_iter().map(|c| c.packet).collect()
    }

    fn check_port(&self, dev: &NetDevice, queued: bool) -> Result<Arc<Mutex<()>>> {
        let state = self.state();
        let port = state
            .ports
            .get(&dev.ifindex())
            .ok_or_else(|| NetHookError::DeviceDown(dev.name().to_string()))?;
        if port.down {
            return Err(NetHookError::DeviceDown(dev.name().to_string()));
        }
        if queued && port.queue_stopped {
            return Err(NetHookError::DeviceBusy(dev.name().to_string()));
        }
        Ok(Arc::clone(&port.xmit_lock))
    }

    fn capture(&self, path: CapturePath, packet: PacketBuf) {
        trace!("Captured {:?} via {:?}", packet, path);
        self.state().captured.push(Captured { path, packet });
    }
}

/// Keeps an interface's transmit slot occupied while alive.
pub struct XmitLockHold {
    lock: Arc<Mutex<()>>,
}

impl XmitLockHold {
    /// Runs `f` while holding the transmit lock.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

impl PacketHost for MemoryHost {
    fn device_by_name(&self, name: &str) -> Option<DeviceRef> {
        self.state().devices.get(name).cloned()
    }

    fn register_hook(&self, point: InterceptionPoint, priority: i32) -> Result<()> {
        let mut state = self.state();
        if state.refused_hooks.contains(&point) {
            return Err(NetHookError::HookRegistration {
                point: point.to_string(),
                reason: "refused by host".to_string(),
            });
        }
        state.hooks.insert(point, priority);
        state.registrations += 1;
        Ok(())
    }

    fn unregister_hook(&self, point: InterceptionPoint) {
        self.state().hooks.remove(&point);
    }

    fn receive(&self, packet: PacketBuf) -> Result<()> {
        self.capture(CapturePath::Ingress, packet);
        Ok(())
    }

    fn transmit_raw(&self, dev: &NetDevice, packet: PacketBuf) -> Result<()> {
        let xmit_lock = self.check_port(dev, false)?;
        let _slot = xmit_lock
            .try_lock()
            .map_err(|_| NetHookError::DeviceBusy(dev.name().to_string()))?;
        self.capture(CapturePath::RawTransmit, packet);
        Ok(())
    }

    fn transmit_queued(&self, packet: PacketBuf) -> Result<()> {
        let dev = packet
            .dev()
            .cloned()
            .ok_or_else(|| NetHookError::DeviceDown("<none>".to_string()))?;
        self.check_port(&dev, true)?;
        self.capture(CapturePath::QueuedTransmit, packet);
        Ok(())
    }
}
