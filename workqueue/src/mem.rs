//! An in-process [`Broker`] backed by `parking_lot`-guarded queues.
//!
//! Used by every unit/integration test in this workspace, and suitable for
//! a single-process run of the whole pipeline. A real deployment would
//! swap this out for a client against an actual message broker without
//! changing any caller of [`Broker`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::{Broker, BrokerError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct QueueState {
    pending: std::collections::VecDeque<Vec<u8>>,
    processing: Vec<(Vec<u8>, Instant)>,
    dead: Vec<(Vec<u8>, String)>,
}

/// In-memory [`Broker`] implementation.
#[derive(Debug, Default)]
pub struct MemBroker {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemBroker {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(payload);
        Ok(())
    }

    async fn claim(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut queues = self.queues.lock();
                let state = queues.entry(queue.to_string()).or_default();
                if let Some(payload) = state.pending.pop_front() {
                    state.processing.push((payload.clone(), Instant::now()));
                    return Ok(Some(payload));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    async fn ack(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        remove_one(&mut state.processing, payload);
        Ok(())
    }

    async fn requeue(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        if remove_one(&mut state.processing, payload) {
            state.pending.push_front(payload.to_vec());
        }
        Ok(())
    }

    async fn deadletter(&self, queue: &str, payload: &[u8], reason: &str) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        if remove_one(&mut state.processing, payload) {
            state.dead.push((payload.to_vec(), reason.to_string()));
        }
        Ok(())
    }

    async fn reclaim_stale(&self, queue: &str, older_than: Duration) -> Result<usize, BrokerError> {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        let now = Instant::now();
        let mut reclaimed = 0usize;
        let mut still_processing = Vec::with_capacity(state.processing.len());
        for (payload, claimed_at) in state.processing.drain(..) {
            if now.duration_since(claimed_at) >= older_than {
                state.pending.push_front(payload);
                reclaimed += 1;
            } else {
                still_processing.push((payload, claimed_at));
            }
        }
        state.processing = still_processing;
        Ok(reclaimed)
    }

    async fn pending_len(&self, queue: &str) -> Result<usize, BrokerError> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map(|s| s.pending.len())
            .unwrap_or(0))
    }

    async fn processing_len(&self, queue: &str) -> Result<usize, BrokerError> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map(|s| s.processing.len())
            .unwrap_or(0))
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<(Vec<u8>, String)>, BrokerError> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map(|s| s.dead.clone())
            .unwrap_or_default())
    }

    async fn clear(&self, queue: &str) -> Result<(), BrokerError> {
        self.queues.lock().remove(queue);
        Ok(())
    }
}

/// Remove the first occurrence of `payload` from `list`. Returns whether
/// anything was removed.
fn remove_one(list: &mut Vec<(Vec<u8>, Instant)>, payload: &[u8]) -> bool {
    if let Some(pos) = list.iter().position(|(p, _)| p.as_slice() == payload) {
        list.remove(pos);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_claim_round_trip() {
        let broker = MemBroker::new();
        broker.publish("q", b"hello".to_vec()).await.unwrap();
        let claimed = broker.claim("q", Duration::from_millis(50)).await.unwrap();
        assert_eq!(claimed, Some(b"hello".to_vec()));
        assert_eq!(broker.pending_len("q").await.unwrap(), 0);
        assert_eq!(broker.processing_len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_times_out_on_empty_queue() {
        let broker = MemBroker::new();
        let claimed = broker.claim("empty", Duration::from_millis(30)).await.unwrap();
        assert_eq!(claimed, None);
    }

    #[tokio::test]
    async fn ack_removes_from_processing() {
        let broker = MemBroker::new();
        broker.publish("q", b"p".to_vec()).await.unwrap();
        broker.claim("q", Duration::from_millis(10)).await.unwrap();
        broker.ack("q", b"p").await.unwrap();
        assert_eq!(broker.processing_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn requeue_moves_to_front_of_pending() {
        let broker = MemBroker::new();
        broker.publish("q", b"first".to_vec()).await.unwrap();
        broker.publish("q", b"second".to_vec()).await.unwrap();
        let claimed = broker.claim("q", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(claimed, b"first");
        broker.requeue("q", b"first").await.unwrap();
        // "first" should be claimed again before "second"
        let next = broker.claim("q", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(next, b"first");
    }

    #[tokio::test]
    async fn deadletter_after_retries_exhausted() {
        let broker = MemBroker::new();
        broker.publish("q", b"poison".to_vec()).await.unwrap();
        broker.claim("q", Duration::from_millis(10)).await.unwrap();
        broker.deadletter("q", b"poison", "parse error").await.unwrap();
        assert_eq!(broker.processing_len("q").await.unwrap(), 0);
        let dead = broker.dead_letters("q").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1, "parse error");
    }

    #[tokio::test]
    async fn reclaim_stale_recovers_crashed_worker_claims() {
        let broker = MemBroker::new();
        broker.publish("q", b"task".to_vec()).await.unwrap();
        broker.claim("q", Duration::from_millis(10)).await.unwrap();
        assert_eq!(broker.processing_len("q").await.unwrap(), 1);

        // Not stale yet.
        let reclaimed = broker.reclaim_stale("q", Duration::from_secs(60)).await.unwrap();
        assert_eq!(reclaimed, 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reclaimed = broker.reclaim_stale("q", Duration::from_millis(20)).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(broker.pending_len("q").await.unwrap(), 1);
        assert_eq!(broker.processing_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_removes_both_lists() {
        let broker = MemBroker::new();
        broker.publish("q", b"a".to_vec()).await.unwrap();
        broker.claim("q", Duration::from_millis(10)).await.unwrap();
        broker.publish("q", b"b".to_vec()).await.unwrap();
        broker.clear("q").await.unwrap();
        assert_eq!(broker.pending_len("q").await.unwrap(), 0);
        assert_eq!(broker.processing_len("q").await.unwrap(), 0);
    }
}
