//! Registry of subscriber contexts and their filters.
//!
//! Contexts live in an arena keyed by stable [`SubscriberId`]s. Contexts
//! with a filter are additionally kept in attach order, which is the order
//! filters are evaluated in: the first subscriber whose filter matches gets
//! the packet. The registry also remembers which interception points have
//! a hook installed.
//!
//! The registry itself is plain data; the engine keeps it behind a single
//! mutex and only traverses or mutates it while holding that lock.

use crate::error::{NetHookError, Result};
use crate::network::core::device::NetDevice;
use crate::network::core::headers::PacketHeaders;
use crate::network::filter::descriptor::Filter;
use crate::network::filter::point::{InterceptionPoint, NUM_POINTS};
use crate::network::processing::queue::SubscriberQueue;
use crate::network::processing::reinject::WriterConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stable handle for one subscriber session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State owned by one subscriber session.
pub struct SubscriberContext {
    queue: Arc<SubscriberQueue>,
    filter: Option<Filter>,
    writer: Option<Arc<WriterConfig>>,
}

impl SubscriberContext {
    pub fn queue(&self) -> &Arc<SubscriberQueue> {
        &self.queue
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn writer(&self) -> Option<&Arc<WriterConfig>> {
        self.writer.as_ref()
    }
}

/// The subscriber a packet was matched to.
pub struct SubscriberHandle<'a> {
    pub id: SubscriberId,
    pub queue: &'a Arc<SubscriberQueue>,
}

/// Subscriber arena, filter order and hook activation flags.
#[derive(Default)]
pub struct FilterRegistry {
    contexts: HashMap<SubscriberId, SubscriberContext>,
    order: Vec<SubscriberId>,
    hooks: [bool; NUM_POINTS],
    next_id: u64,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with no filter and no writer.
    pub fn open(&mut self, queue: Arc<SubscriberQueue>) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.contexts.insert(
            id,
            SubscriberContext {
                queue,
                filter: None,
                writer: None,
            },
        );
        id
    }

    /// Removes a context and everything it holds.
    pub fn close(&mut self, id: SubscriberId) -> Option<SubscriberContext> {
        self.order.retain(|s| *s != id);
        self.contexts.remove(&id)
    }

    pub fn context(&self, id: SubscriberId) -> Option<&SubscriberContext> {
        self.contexts.get(&id)
    }

    fn context_mut(&mut self, id: SubscriberId) -> Result<&mut SubscriberContext> {
        self.contexts
            .get_mut(&id)
            .ok_or(NetHookError::UnknownSession(id))
    }

    /// Attaches `filter` to a subscriber, placing it last in match order.
    ///
    /// A filter already attached is replaced and returned; the subscriber
    /// moves to the end of the order as if it had detached and re-attached.
    pub fn attach(&mut self, id: SubscriberId, filter: Filter) -> Result<Option<Filter>> {
        let previous = self.context_mut(id)?.filter.replace(filter);
        self.order.retain(|s| *s != id);
        self.order.push(id);
        Ok(previous)
    }

    /// Detaches a subscriber's filter, returning it. No-op without one.
    pub fn detach(&mut self, id: SubscriberId) -> Option<Filter> {
        let filter = self.contexts.get_mut(&id)?.filter.take()?;
        self.order.retain(|s| *s != id);
        Some(filter)
    }

    /// Replaces a subscriber's writer, returning the previous one.
    pub fn set_writer(
        &mut self,
        id: SubscriberId,
        writer: WriterConfig,
    ) -> Result<Option<Arc<WriterConfig>>> {
        Ok(self.context_mut(id)?.writer.replace(Arc::new(writer)))
    }

    pub fn writer(&self, id: SubscriberId) -> Option<Arc<WriterConfig>> {
        self.contexts.get(&id)?.writer.clone()
    }

    pub fn has_filter(&self, id: SubscriberId) -> bool {
        self.contexts.get(&id).is_some_and(|c| c.filter.is_some())
    }

    /// Finds the first subscriber, in attach order, whose filter matches.
    pub fn find_match(
        &self,
        point: InterceptionPoint,
        headers: &PacketHeaders,
        in_dev: Option<&NetDevice>,
        out_dev: Option<&NetDevice>,
    ) -> Option<SubscriberHandle<'_>> {
        self.order.iter().find_map(|id| {
            let ctx = self.contexts.get(id)?;
            let filter = ctx.filter.as_ref()?;
            filter
                .matches(point, headers, in_dev, out_dev)
                .then_some(SubscriberHandle {
                    id: *id,
                    queue: &ctx.queue,
                })
        })
    }

    pub fn is_hooked(&self, point: InterceptionPoint) -> bool {
        self.hooks[point.index()]
    }

    pub fn mark_hooked(&mut self, point: InterceptionPoint) {
        self.hooks[point.index()] = true;
    }

    /// Clears every hook flag, returning the points that were active.
    pub fn take_hooks(&mut self) -> Vec<InterceptionPoint> {
        let active = self.active_points();
        self.hooks = [false; NUM_POINTS];
        active
    }

    pub fn active_points(&self) -> Vec<InterceptionPoint> {
        InterceptionPoint::ALL
            .into_iter()
            .filter(|p| self.hooks[p.index()])
            .collect()
    }

    /// Subscribers with a filter, in match order.
    pub fn filter_order(&self) -> &[SubscriberId] {
        &self.order
    }

    /// Number of open subscriber contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Removes every context, returning them for release.
    pub fn drain(&mut self) -> Vec<(SubscriberId, SubscriberContext)> {
        self.order.clear();
        self.contexts.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::core::headers::testing::tcp_packet;
    use crate::network::core::headers::ETH_P_IP;
    use crate::network::filter::descriptor::FilterDescriptor;

    fn filter(desc: FilterDescriptor) -> Filter {
        Filter::resolve(&desc, |_| None).unwrap()
    }

    fn headers(dport: u16) -> PacketHeaders {
        PacketHeaders::parse(ETH_P_IP, &tcp_packet(5555, dport))
    }

    fn open(registry: &mut FilterRegistry) -> SubscriberId {
        registry.open(Arc::new(SubscriberQueue::new()))
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = FilterRegistry::new();
        let a = open(&mut registry);
        let b = open(&mut registry);
        let point = InterceptionPoint::PostRouting;

        registry.attach(a, filter(FilterDescriptor::at(point))).unwrap();
        registry
            .attach(b, filter(FilterDescriptor::at(point).dport(80)))
            .unwrap();

        let hit = registry.find_match(point, &headers(80), None, None).unwrap();
        assert_eq!(hit.id, a);

        registry.detach(a);
        let hit = registry.find_match(point, &headers(80), None, None).unwrap();
        assert_eq!(hit.id, b);
        assert!(registry.find_match(point, &headers(443), None, None).is_none());
    }

    #[test]
    fn test_order_follows_attach_not_open() {
        let mut registry = FilterRegistry::new();
        let a = open(&mut registry);
        let b = open(&mut registry);
        let point = InterceptionPoint::LocalIn;

        registry.attach(b, filter(FilterDescriptor::at(point))).unwrap();
        registry.attach(a, filter(FilterDescriptor::at(point))).unwrap();
        assert_eq!(registry.filter_order(), &[b, a]);

        let hit = registry.find_match(point, &headers(1), None, None).unwrap();
        assert_eq!(hit.id, b);
    }

    #[test]
    fn test_replace_filter_moves_to_end() {
        let mut registry = FilterRegistry::new();
        let a = open(&mut registry);
        let b = open(&mut registry);
        let point = InterceptionPoint::Forward;

        registry.attach(a, filter(FilterDescriptor::at(point))).unwrap();
        registry.attach(b, filter(FilterDescriptor::at(point))).unwrap();
        let previous = registry
            .attach(a, filter(FilterDescriptor::at(point).dport(22)))
            .unwrap();

        assert!(previous.is_some());
        assert_eq!(registry.filter_order(), &[b, a]);
    }

    #[test]
    fn test_detach_without_filter_is_noop() {
        let mut registry = FilterRegistry::new();
        let a = open(&mut registry);
        assert!(registry.detach(a).is_none());
        assert!(!registry.has_filter(a));
    }

    #[test]
    fn test_close_removes_from_order() {
        let mut registry = FilterRegistry::new();
        let a = open(&mut registry);
        registry
            .attach(a, filter(FilterDescriptor::at(InterceptionPoint::LocalOut)))
            .unwrap();

        assert!(registry.close(a).is_some());
        assert!(registry.filter_order().is_empty());
        assert!(registry.is_empty());
        assert!(matches!(
            registry.attach(a, filter(FilterDescriptor::at(InterceptionPoint::LocalOut))),
            Err(NetHookError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_hook_flags() {
        let mut registry = FilterRegistry::new();
        assert!(!registry.is_hooked(InterceptionPoint::Forward));
        registry.mark_hooked(InterceptionPoint::Forward);
        registry.mark_hooked(InterceptionPoint::PreRouting);
        assert_eq!(
            registry.active_points(),
            vec![InterceptionPoint::PreRouting, InterceptionPoint::Forward]
        );
        assert_eq!(registry.take_hooks().len(), 2);
        assert!(registry.active_points().is_empty());
    }
}
