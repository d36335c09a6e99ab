use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::foundation::error::{ConvError, ConvResult};

/// A message handed to a consumer. It stays unsettled until acked or rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub queue: String,
    pub payload: Vec<u8>,
}

/// Point-to-point work queue.
pub trait MessageTransport: Send + Sync {
    fn publish(&self, queue: &str, payload: &[u8]) -> ConvResult<()>;

    /// Next message on `queue`, or `None` when it is empty.
    fn consume(&self, queue: &str) -> ConvResult<Option<Delivery>>;

    fn ack(&self, delivery: &Delivery) -> ConvResult<()>;

    /// Settle `delivery` as failed. It is dropped, never requeued.
    fn reject(&self, delivery: &Delivery) -> ConvResult<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub rejected: u64,
    /// Delivered but not yet settled.
    pub unsettled: usize,
}

#[derive(Default)]
struct TransportState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    unsettled: HashSet<u64>,
    next_tag: u64,
    stats: TransportStats,
}

/// In-process transport for a worker living in the same binary as its producer.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<TransportState>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("stats", &self.stats())
            .finish()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransportStats {
        let st = self.lock();
        TransportStats {
            unsettled: st.unsettled.len(),
            ..st.stats
        }
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, delivery: &Delivery, verb: &str) -> ConvResult<()> {
        let mut st = self.lock();
        if !st.unsettled.remove(&delivery.tag) {
            return Err(ConvError::transport(format!(
                "{verb}: delivery {} on '{}' is not outstanding",
                delivery.tag, delivery.queue
            )));
        }
        if verb == "ack" {
            st.stats.acked += 1;
        } else {
            st.stats.rejected += 1;
        }
        Ok(())
    }
}

impl MessageTransport for MemoryTransport {
    fn publish(&self, queue: &str, payload: &[u8]) -> ConvResult<()> {
        if queue.is_empty() {
            return Err(ConvError::transport("queue name must not be empty"));
        }
        let mut st = self.lock();
        st.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        st.stats.published += 1;
        Ok(())
    }

    fn consume(&self, queue: &str) -> ConvResult<Option<Delivery>> {
        let mut st = self.lock();
        let Some(payload) = st.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        st.next_tag += 1;
        let tag = st.next_tag;
        st.unsettled.insert(tag);
        st.stats.delivered += 1;
        Ok(Some(Delivery {
            tag,
            queue: queue.to_string(),
            payload,
        }))
    }

    fn ack(&self, delivery: &Delivery) -> ConvResult<()> {
        self.settle(delivery, "ack")
    }

    fn reject(&self, delivery: &Delivery) -> ConvResult<()> {
        self.settle(delivery, "reject")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_per_queue() {
        let t = MemoryTransport::new();
        t.publish("q", b"1").unwrap();
        t.publish("q", b"2").unwrap();
        t.publish("other", b"x").unwrap();
        assert_eq!(t.pending("q"), 2);

        let d1 = t.consume("q").unwrap().unwrap();
        let d2 = t.consume("q").unwrap().unwrap();
        assert_eq!((d1.payload.as_slice(), d2.payload.as_slice()), (&b"1"[..], &b"2"[..]));
        assert!(t.consume("q").unwrap().is_none());
        assert_eq!(t.pending("other"), 1);
    }

    #[test]
    fn settling_twice_is_an_error() {
        let t = MemoryTransport::new();
        t.publish("q", b"m").unwrap();
        let d = t.consume("q").unwrap().unwrap();
        assert_eq!(t.stats().unsettled, 1);

        t.reject(&d).unwrap();
        assert!(matches!(t.ack(&d), Err(ConvError::Transport(_))));

        let s = t.stats();
        assert_eq!((s.published, s.delivered, s.acked, s.rejected, s.unsettled), (1, 1, 0, 1, 0));
        // Rejected messages are not requeued.
        assert_eq!(t.pending("q"), 0);
    }
}
