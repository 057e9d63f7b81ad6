//! Dispatch Queue: a bounded multi-producer/multi-consumer lock-free queue
//! carrying `RxSymbol` events from receive workers to the dispatcher.
//!
//! Backed by `crossbeam::queue::ArrayQueue`, the same lock-free MPMC
//! primitive this codebase's discovery-layer buffer pool uses for its
//! freelist. Producers never block: a full queue means the capture is
//! dropped and the caller is expected to log a warning and release the
//! ring slot immediately.

use crossbeam::queue::ArrayQueue;

use crate::packet::DispatchEvent;

/// Queue capacity multiplier applied to `rx_ring_size`.
pub const K_QUEUE_SIZE: usize = 36;

/// Maximum events drained per dispatcher iteration.
pub const K_DEQUEUE_BULK_SIZE: usize = 5;

pub struct DispatchQueue {
    queue: ArrayQueue<DispatchEvent>,
}

impl DispatchQueue {
    pub fn new(rx_ring_size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(rx_ring_size * K_QUEUE_SIZE),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Attempts to enqueue an event. Returns the event back on failure so the
    /// caller can release the owning ring slot and log a drop.
    pub fn try_push(&self, event: DispatchEvent) -> Result<(), DispatchEvent> {
        self.queue.push(event)
    }

    /// Drains up to `K_DEQUEUE_BULK_SIZE` events into `out`, returning the
    /// number drained.
    pub fn drain_bulk(&self, out: &mut Vec<DispatchEvent>) -> usize {
        let mut n = 0;
        while n < K_DEQUEUE_BULK_SIZE {
            match self.queue.pop() {
                Some(ev) => {
                    out.push(ev);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DispatchEventKind;

    fn event(antenna_id: u32) -> DispatchEvent {
        DispatchEvent {
            event_type: DispatchEventKind::RxSymbol,
            antenna_id,
            ring_offset: 0,
        }
    }

    #[test]
    fn capacity_is_rx_ring_size_times_constant() {
        let q = DispatchQueue::new(10);
        assert_eq!(q.capacity(), 10 * K_QUEUE_SIZE);
    }

    #[test]
    fn bulk_drain_respects_cap() {
        let q = DispatchQueue::new(1);
        for i in 0..20 {
            q.try_push(event(i)).unwrap();
        }
        let mut out = Vec::new();
        let n = q.drain_bulk(&mut out);
        assert_eq!(n, K_DEQUEUE_BULK_SIZE);
        assert_eq!(out.len(), K_DEQUEUE_BULK_SIZE);
    }

    #[test]
    fn push_fails_when_full() {
        let q = DispatchQueue::new(1);
        for i in 0..K_QUEUE_SIZE as u32 {
            assert!(q.try_push(event(i)).is_ok());
        }
        assert!(q.try_push(event(999)).is_err());
    }
}
