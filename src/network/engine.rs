//! The interception engine shared by the host callback and all sessions.

use crate::error::{NetHookError, Result};
use crate::network::core::device::NetDevice;
use crate::network::core::host::PacketHost;
use crate::network::core::packet::PacketBuf;
use crate::network::filter::{FilterRegistry, InterceptionPoint, SubscriberId};
use crate::network::processing::interceptor::{self, Verdict};
use crate::network::processing::loop_guard::LoopGuard;
use crate::network::processing::reinject::{Reinjector, WriterConfig};
use crate::network::processing::session::Session;
use crate::network::processing::stats::{InterceptStats, StatsSnapshot};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) struct Shared {
    pub(crate) host: Arc<dyn PacketHost>,
    registry: Mutex<FilterRegistry>,
    pub(crate) loop_guard: LoopGuard,
    pub(crate) stats: InterceptStats,
}

impl Shared {
    pub(crate) fn registry(&self) -> MutexGuard<'_, FilterRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn reinject(&self, writer: &WriterConfig, frame: &[u8]) -> Result<usize> {
        let result = Reinjector::new(self.host.as_ref(), &self.loop_guard).inject(writer, frame);
        match &result {
            Ok(_) => self.stats.record_injected(writer.mode()),
            Err(e) => {
                debug!("Reinjection via {} failed: {}", writer.dest_name(), e);
                self.stats.record_inject_failure();
            }
        }
        result
    }
}

/// Packet interception and reinjection on top of a [`PacketHost`].
///
/// Cloning is cheap; clones share the same registry, loop guard and
/// counters.
#[derive(Clone)]
pub struct NetHook {
    shared: Arc<Shared>,
}

impl NetHook {
    pub fn new(host: Arc<dyn PacketHost>) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                registry: Mutex::new(FilterRegistry::new()),
                loop_guard: LoopGuard::new(),
                stats: InterceptStats::new(),
            }),
        }
    }

    pub fn host(&self) -> &Arc<dyn PacketHost> {
        &self.shared.host
    }

    /// Opens a subscriber session with no filter and no writer.
    pub fn open_session(&self) -> Session {
        Session::open(Arc::clone(&self.shared))
    }

    /// Runs interception for a packet the host saw at `point`.
    ///
    /// Safe to call concurrently from any number of threads; never blocks
    /// beyond the registry and queue locks.
    pub fn intercept(
        &self,
        point: InterceptionPoint,
        packet: PacketBuf,
        in_dev: Option<&NetDevice>,
        out_dev: Option<&NetDevice>,
    ) -> Verdict {
        interceptor::intercept(&self.shared, point, packet, in_dev, out_dev)
    }

    /// Reinjects `frame` using subscriber `id`'s writer.
    pub fn inject(&self, id: SubscriberId, frame: &[u8]) -> Result<usize> {
        let writer = self
            .shared
            .registry()
            .writer(id)
            .ok_or(NetHookError::NotConfigured(id))?;
        self.shared.reinject(&writer, frame)
    }

    /// Removes every installed hook and releases every subscriber context.
    ///
    /// Sessions still open afterwards see their filter and writer gone and
    /// their queue closed.
    pub fn deactivate_all(&self) {
        let (points, contexts) = {
            let mut registry = self.shared.registry();
            (registry.take_hooks(), registry.drain())
        };

        for point in &points {
            self.shared.host.unregister_hook(*point);
        }

        let mut drained = 0;
        for (id, context) in contexts {
            let freed = context.queue().close();
            if !freed.is_empty() {
                warn!("Subscriber {} still had {} queued packets", id, freed.len());
            }
            drained += freed.len();
        }
        self.shared.stats.record_drained(drained);

        info!(
            "Deactivated {} interception points, freed {} queued packets",
            points.len(),
            drained
        );
    }

    /// Points with an installed hook.
    pub fn active_points(&self) -> Vec<InterceptionPoint> {
        self.shared.registry().active_points()
    }

    /// Number of open subscriber contexts.
    pub fn session_count(&self) -> usize {
        self.shared.registry().len()
    }

    /// Reinjected packets that have not come back through interception yet.
    pub fn loop_outstanding(&self) -> usize {
        self.shared.loop_guard.outstanding()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}
