use crate::network::processing::reinject::WriteMode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by the interception and reinjection paths.
///
/// Updated from the hot path with relaxed atomics; a [`StatsSnapshot`] is a
/// point-in-time copy that is not guaranteed to be consistent across fields.
#[derive(Debug, Default)]
pub struct InterceptStats {
    seen: AtomicU64,
    passthrough: AtomicU64,
    diverted: AtomicU64,
    loop_passes: AtomicU64,
    enqueue_failures: AtomicU64,
    delivered: AtomicU64,
    short_read_discards: AtomicU64,
    drained_on_close: AtomicU64,
    injected_to_stack: AtomicU64,
    injected_to_interface: AtomicU64,
    injected_to_interface_queue: AtomicU64,
    inject_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl InterceptStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_seen(&self) {
        bump(&self.seen);
    }

    pub(crate) fn record_passthrough(&self) {
        bump(&self.passthrough);
    }

    pub(crate) fn record_diverted(&self) {
        bump(&self.diverted);
    }

    pub(crate) fn record_loop_pass(&self) {
        bump(&self.loop_passes);
    }

    pub(crate) fn record_enqueue_failure(&self) {
        bump(&self.enqueue_failures);
    }

    pub(crate) fn record_delivered(&self) {
        bump(&self.delivered);
    }

    pub(crate) fn record_short_read(&self) {
        bump(&self.short_read_discards);
    }

    pub(crate) fn record_drained(&self, count: usize) {
        self.drained_on_close
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_injected(&self, mode: WriteMode) {
        match mode {
            WriteMode::ToStack => bump(&self.injected_to_stack),
            WriteMode::ToInterface => bump(&self.injected_to_interface),
            WriteMode::ToInterfaceQueue => bump(&self.injected_to_interface_queue),
        }
    }

    pub(crate) fn record_inject_failure(&self) {
        bump(&self.inject_failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            seen: load(&self.seen),
            passthrough: load(&self.passthrough),
            diverted: load(&self.diverted),
            loop_passes: load(&self.loop_passes),
            enqueue_failures: load(&self.enqueue_failures),
            delivered: load(&self.delivered),
            short_read_discards: load(&self.short_read_discards),
            drained_on_close: load(&self.drained_on_close),
            injected_to_stack: load(&self.injected_to_stack),
            injected_to_interface: load(&self.injected_to_interface),
            injected_to_interface_queue: load(&self.injected_to_interface_queue),
            inject_failures: load(&self.inject_failures),
        }
    }
}

/// Plain copy of [`InterceptStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Packets that reached the interception callback
    pub seen: u64,
    /// Packets returned to the host unchanged, loop passes included
    pub passthrough: u64,
    /// Packets taken over by a subscriber
    pub diverted: u64,
    /// Reinjected packets recognised and let through
    pub loop_passes: u64,
    /// Matches that could not be queued and were let through
    pub enqueue_failures: u64,
    /// Packets copied out to a reader
    pub delivered: u64,
    /// Packets discarded because the read buffer was too small
    pub short_read_discards: u64,
    /// Packets released unread when their subscriber closed
    pub drained_on_close: u64,
    pub injected_to_stack: u64,
    pub injected_to_interface: u64,
    pub injected_to_interface_queue: u64,
    pub inject_failures: u64,
}

impl StatsSnapshot {
    pub fn injected(&self) -> u64 {
        self.injected_to_stack + self.injected_to_interface + self.injected_to_interface_queue
    }

    /// Percentage of seen packets that were diverted.
    pub fn diversion_rate(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.diverted as f64 / self.seen as f64 * 100.0
        }
    }

    /// Diverted packets neither delivered, discarded nor drained yet.
    pub fn in_flight(&self) -> u64 {
        self.diverted
            .saturating_sub(self.delivered + self.short_read_discards + self.drained_on_close)
    }
}
