//! The per-packet callback run at every hooked interception point.
//!
//! It never blocks: a loop-token check, one header parse and a registry walk
//! under the registry lock, then either an enqueue or a passthrough.

use crate::network::core::device::NetDevice;
use crate::network::core::packet::PacketBuf;
use crate::network::engine::Shared;
use crate::network::filter::InterceptionPoint;
use log::{trace, warn};

/// What the host should do with a packet after interception.
#[derive(Debug)]
pub enum Verdict {
    /// Continue normal processing with the packet handed back
    Accept(PacketBuf),
    /// The packet now belongs to a subscriber
    Stolen,
}

impl Verdict {
    pub fn is_stolen(&self) -> bool {
        matches!(self, Self::Stolen)
    }

    /// The packet to keep processing, if it was not stolen.
    pub fn into_packet(self) -> Option<PacketBuf> {
        match self {
            Self::Accept(packet) => Some(packet),
            Self::Stolen => None,
        }
    }
}

pub(crate) fn intercept(
    shared: &Shared,
    point: InterceptionPoint,
    mut packet: PacketBuf,
    in_dev: Option<&NetDevice>,
    out_dev: Option<&NetDevice>,
) -> Verdict {
    shared.stats.record_seen();

    if let Some(token) = packet.take_loop_token() {
        match shared.loop_guard.claim(token) {
            Ok(()) => {
                trace!("{}: letting reinjected {:?} through", point, packet);
                shared.stats.record_loop_pass();
                shared.stats.record_passthrough();
                return Verdict::Accept(packet);
            }
            Err(foreign) => packet.attach_loop_token(foreign),
        }
    }

    let headers = packet.headers();
    let registry = shared.registry();
    let Some(target) = registry.find_match(point, &headers, in_dev, out_dev) else {
        shared.stats.record_passthrough();
        return Verdict::Accept(packet);
    };

    let id = target.id;
    match target.queue.enqueue(packet) {
        Ok(()) => {
            trace!("{}: diverted packet to subscriber {}", point, id);
            shared.stats.record_diverted();
            Verdict::Stolen
        }
        Err(err) => {
            warn!("{}: could not queue packet for subscriber {}: {:?}", point, id, err);
            shared.stats.record_enqueue_failure();
            shared.stats.record_passthrough();
            Verdict::Accept(err.into_packet())
        }
    }
}
