//! Per-subscriber session: control requests and blocking packet I/O.

use crate::error::{NetHookError, Result};
use crate::network::engine::Shared;
use crate::network::filter::{Filter, FilterDescriptor, SubscriberId};
use crate::network::processing::queue::{Interrupter, SubscriberQueue};
use crate::network::processing::reinject::{WriterConfig, WriterDescriptor};
use log::{debug, info};
use std::sync::Arc;

/// A control request on a session.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    SetFilter(FilterDescriptor),
    RemoveFilter,
    SetWriteMode(WriterDescriptor),
}

/// One subscriber's open session.
///
/// Closing (explicitly or by dropping) detaches the filter, releases the
/// writer and frees every packet still queued.
pub struct Session {
    id: SubscriberId,
    shared: Arc<Shared>,
    queue: Arc<SubscriberQueue>,
    open: bool,
}

impl Session {
    pub(crate) fn open(shared: Arc<Shared>) -> Self {
        let queue = Arc::new(SubscriberQueue::new());
        let id = shared.registry().open(Arc::clone(&queue));
        debug!("Opened subscriber {}", id);
        Self {
            id,
            shared,
            queue,
            open: true,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn control(&self, request: ControlRequest) -> Result<()> {
        match request {
            ControlRequest::SetFilter(desc) => self.set_filter(&desc),
            ControlRequest::RemoveFilter => {
                self.remove_filter();
                Ok(())
            }
            ControlRequest::SetWriteMode(desc) => self.set_write_mode(&desc),
        }
    }

    /// Validates and installs a filter, replacing any current one.
    ///
    /// The interception point's hook is installed the first time any filter
    /// targets it. On failure nothing is attached.
    pub fn set_filter(&self, desc: &FilterDescriptor) -> Result<()> {
        let filter = Filter::resolve(desc, |name| self.shared.host.device_by_name(name))?;
        let point = filter.point();

        let mut registry = self.shared.registry();
        if registry.context(self.id).is_none() {
            return Err(NetHookError::UnknownSession(self.id));
        }
        if !registry.is_hooked(point) {
            self.shared.host.register_hook(point, filter.priority())?;
            registry.mark_hooked(point);
            info!("Activated interception at {} (priority {})", point, filter.priority());
        }

        debug!("Subscriber {} filtering {}", self.id, filter);
        if let Some(previous) = registry.attach(self.id, filter)? {
            debug!("Subscriber {} replaced filter {}", self.id, previous);
        }
        Ok(())
    }

    /// Detaches the current filter. Does nothing if there is none.
    pub fn remove_filter(&self) {
        if let Some(previous) = self.shared.registry().detach(self.id) {
            debug!("Subscriber {} removed filter {}", self.id, previous);
        }
    }

    /// Attaches a write configuration.
    ///
    /// A destination that does not resolve is accepted here and reported by
    /// every subsequent write.
    pub fn set_write_mode(&self, desc: &WriterDescriptor) -> Result<()> {
        let writer = WriterConfig::resolve(desc, |name| self.shared.host.device_by_name(name));
        if writer.dest().is_none() {
            debug!(
                "Subscriber {} writer destination {} did not resolve",
                self.id, desc.dest_dev
            );
        }
        self.shared.registry().set_writer(self.id, writer)?;
        debug!("Subscriber {} writing {} via {}", self.id, desc.mode, desc.dest_dev);
        Ok(())
    }

    /// Blocks until a diverted packet is available and copies it, link header
    /// included, into `buf`.
    ///
    /// A packet that does not fit is discarded and `BufferTooSmall` returned.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.shared.registry().has_filter(self.id) {
            return Err(NetHookError::BadState("no filter attached"));
        }

        let mut packet = self.queue.dequeue_blocking()?;
        packet.restore_link_header()?;

        let needed = packet.len();
        if needed > buf.len() {
            self.shared.stats.record_short_read();
            debug!(
                "Subscriber {} discarded a {} byte packet for a {} byte buffer",
                self.id,
                needed,
                buf.len()
            );
            return Err(NetHookError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        buf[..needed].copy_from_slice(packet.data());
        self.shared.stats.record_delivered();
        Ok(needed)
    }

    /// Reinjects a complete Ethernet frame through the attached writer.
    pub fn write(&self, frame: &[u8]) -> Result<usize> {
        let writer = self
            .shared
            .registry()
            .writer(self.id)
            .ok_or(NetHookError::BadState("no write mode set"))?;
        self.shared.reinject(&writer, frame)
    }

    /// A handle that can cancel this session's blocking reads from another
    /// thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter::new(Arc::clone(&self.queue))
    }

    /// Packets waiting to be read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        // Unlink first so the callback can no longer pick this queue.
        let context = self.shared.registry().close(self.id);
        drop(context);

        let drained = self.queue.close();
        if !drained.is_empty() {
            self.shared.stats.record_drained(drained.len());
        }
        debug!(
            "Closed subscriber {}, freed {} queued packets",
            self.id,
            drained.len()
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
