//! Per-subscriber packet queue with blocking reads.
//!
//! Enqueue never blocks and never allocates beyond a fallible reservation;
//! readers sleep on a condition variable until a packet arrives or they are
//! interrupted.

use crate::error::{NetHookError, Result};
use crate::network::core::packet::PacketBuf;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct QueueState {
    packets: VecDeque<PacketBuf>,
    interrupt_pending: bool,
    closed: bool,
}

/// Why an enqueue was refused. The packet is handed back in either case.
#[derive(Debug)]
pub enum EnqueueError {
    /// The subscriber is closing
    Closed(PacketBuf),
    /// No memory for the queue entry
    NoMemory(PacketBuf),
}

impl EnqueueError {
    pub fn into_packet(self) -> PacketBuf {
        match self {
            Self::Closed(packet) | Self::NoMemory(packet) => packet,
        }
    }
}

/// FIFO of packets diverted to one subscriber.
#[derive(Default)]
pub struct SubscriberQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl SubscriberQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a packet and wakes one waiting reader.
    pub fn enqueue(&self, packet: PacketBuf) -> std::result::Result<(), EnqueueError> {
        let mut state = self.state();
        if state.closed {
            return Err(EnqueueError::Closed(packet));
        }
        if state.packets.try_reserve(1).is_err() {
            return Err(EnqueueError::NoMemory(packet));
        }
        state.packets.push_back(packet);
        drop(state);

        self.ready.notify_one();
        Ok(())
    }

    /// Waits for the next packet.
    ///
    /// Returns `Interrupted` without consuming anything if an interrupt is
    /// pending or arrives while waiting. Wakeups that find the queue empty go
    /// back to sleep.
    pub fn dequeue_blocking(&self) -> Result<PacketBuf> {
        let mut state = self.state();
        loop {
            if state.interrupt_pending {
                state.interrupt_pending = false;
                return Err(NetHookError::Interrupted);
            }
            if let Some(packet) = state.packets.pop_front() {
                return Ok(packet);
            }
            if state.closed {
                return Err(NetHookError::BadState("subscriber closed"));
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the next packet if one is queued.
    pub fn try_dequeue(&self) -> Option<PacketBuf> {
        self.state().packets.pop_front()
    }

    /// Delivers an interrupt to one reader.
    ///
    /// If no reader is waiting, the interrupt stays pending and the next
    /// blocking read returns `Interrupted`.
    pub fn interrupt(&self) {
        self.state().interrupt_pending = true;
        self.ready.notify_all();
    }

    /// Refuses further packets and returns everything still queued.
    pub fn close(&self) -> Vec<PacketBuf> {
        let mut state = self.state();
        state.closed = true;
        let drained = state.packets.drain(..).collect();
        drop(state);

        self.ready.notify_all();
        drained
    }

    pub fn len(&self) -> usize {
        self.state().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Cancellation handle for a subscriber's blocking reads.
#[derive(Clone)]
pub struct Interrupter {
    queue: Arc<SubscriberQueue>,
}

impl Interrupter {
    pub(crate) fn new(queue: Arc<SubscriberQueue>) -> Self {
        Self { queue }
    }

    pub fn interrupt(&self) {
        self.queue.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn packet(tag: u8) -> PacketBuf {
        PacketBuf::try_with_headroom(0, &[tag]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue = SubscriberQueue::new();
        for tag in 0..4 {
            queue.enqueue(packet(tag)).unwrap();
        }
        assert_eq!(queue.len(), 4);

        for tag in 0..4 {
            assert_eq!(queue.dequeue_blocking().unwrap().data(), &[tag]);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_blocking_read_wakes_on_enqueue() {
        let queue = Arc::new(SubscriberQueue::new());
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let first = queue.dequeue_blocking().unwrap();
                let second = queue.dequeue_blocking().unwrap();
                (first.data()[0], second.data()[0])
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!reader.is_finished());

        queue.enqueue(packet(1)).unwrap();
        queue.enqueue(packet(2)).unwrap();
        assert_eq!(reader.join().unwrap(), (1, 2));
    }

    #[test]
    fn test_interrupt_wakes_reader_without_consuming() {
        let queue = Arc::new(SubscriberQueue::new());
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue_blocking())
        };

        thread::sleep(Duration::from_millis(50));
        queue.interrupt();
        assert!(matches!(
            reader.join().unwrap(),
            Err(NetHookError::Interrupted)
        ));

        queue.enqueue(packet(7)).unwrap();
        assert_eq!(queue.dequeue_blocking().unwrap().data(), &[7]);
    }

    #[test]
    fn test_enqueue_wakes_one_of_two_readers() {
        let queue = Arc::new(SubscriberQueue::new());
        let (tx, rx) = mpsc::channel();
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                thread::spawn(move || {
                    let result = queue.dequeue_blocking().map(|p| p.data()[0]);
                    tx.send(result).unwrap();
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.enqueue(packet(9)).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.unwrap(), 9);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(readers.iter().filter(|r| r.is_finished()).count(), 1);

        queue.interrupt();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(second, Err(NetHookError::Interrupted)));
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_pending_interrupt_wins_over_queued_packet() {
        let queue = SubscriberQueue::new();
        queue.enqueue(packet(3)).unwrap();
        queue.interrupt();

        assert!(matches!(
            queue.dequeue_blocking(),
            Err(NetHookError::Interrupted)
        ));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue_blocking().unwrap().data(), &[3]);
    }

    #[test]
    fn test_close_drains_and_refuses() {
        let queue = SubscriberQueue::new();
        queue.enqueue(packet(1)).unwrap();
        queue.enqueue(packet(2)).unwrap();

        let drained = queue.close();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_closed());

        let refused = queue.enqueue(packet(9)).unwrap_err();
        assert!(matches!(refused, EnqueueError::Closed(_)));
        assert_eq!(refused.into_packet().data(), &[9]);
        assert!(matches!(
            queue.dequeue_blocking(),
            Err(NetHookError::BadState(_))
        ));
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(SubscriberQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for tag in 0..50 {
                        queue.enqueue(packet(tag)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut count = 0;
        while queue.try_dequeue().is_some() {
            count += 1;
        }
        assert_eq!(count, 200);
    }
}
