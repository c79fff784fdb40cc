//! # In-process queue
//!
//! [`MemoryQueue`] implements [`QueueClient`] on top of a local FIFO. It mirrors
//! the observable behavior the pipeline relies on:
//! - `receive` long-polls up to `wait` and returns at most `max_messages`;
//! - every delivery carries a fresh delete handle;
//! - deleted messages are recorded so tests can assert acknowledgement;
//! - receive/delete failures can be injected.
//!
//! Received-but-undeleted messages stay in flight; there is no visibility
//! timeout, so they are never redelivered.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::QueueError;
use crate::queue::{DeleteEntry, DeleteHandle, MessageBatch, QueueClient, QueueMessage};

#[derive(Default)]
struct State {
    ready: VecDeque<(String, Bytes)>,
    in_flight: HashMap<DeleteHandle, String>,
    deleted: Vec<String>,
    delete_calls: Vec<usize>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    arrivals: Notify,
    next_id: AtomicU64,
    receive_calls: AtomicU64,
    fail_receives: AtomicUsize,
    fail_deletes: AtomicUsize,
}

/// Cloneable in-process queue; clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one message and returns its id.
    pub fn push(&self, body: impl Into<Bytes>) -> String {
        self.push_all([body.into()])
            .pop()
            .unwrap_or_default()
    }

    /// Enqueues several messages atomically, so a single receive can observe
    /// all of them (up to its batch cap). Returns their ids in order.
    pub fn push_all<I, B>(&self, bodies: I) -> Vec<String>
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let ids: Vec<String> = {
            let mut state = self.shared.state.lock();
            bodies
                .into_iter()
                .map(|body| {
                    let id = format!("m{}", self.shared.next_id.fetch_add(1, Ordering::Relaxed));
                    state.ready.push_back((id.clone(), body.into()));
                    id
                })
                .collect()
        };
        self.shared.arrivals.notify_waiters();
        ids
    }

    /// Makes the next `n` receive calls fail.
    pub fn fail_next_receives(&self, n: usize) {
        self.shared.fail_receives.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` delete calls fail.
    pub fn fail_next_deletes(&self, n: usize) {
        self.shared.fail_deletes.store(n, Ordering::SeqCst);
    }

    /// Messages waiting to be received.
    pub fn ready_len(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Messages received but not yet deleted.
    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Ids of deleted messages, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.shared.state.lock().deleted.clone()
    }

    /// Entry count of every successful delete call, in call order.
    pub fn delete_calls(&self) -> Vec<usize> {
        self.shared.state.lock().delete_calls.clone()
    }

    /// Total receive calls, including failed and empty ones.
    pub fn receive_calls(&self) -> u64 {
        self.shared.receive_calls.load(Ordering::Relaxed)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_ready(&self, max_messages: usize) -> MessageBatch {
        let mut state = self.shared.state.lock();
        let n = max_messages.min(state.ready.len());
        let drained: Vec<(String, Bytes)> = state.ready.drain(..n).collect();
        let mut messages = Vec::with_capacity(n);
        for (id, body) in drained {
            let handle = DeleteHandle::new(format!(
                "{id}-r{}",
                self.shared.next_id.fetch_add(1, Ordering::Relaxed)
            ));
            state.in_flight.insert(handle.clone(), id.clone());
            messages.push(QueueMessage::new(id, body, handle));
        }
        MessageBatch::new(messages)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<MessageBatch, QueueError> {
        self.shared.receive_calls.fetch_add(1, Ordering::Relaxed);
        if Self::take_failure(&self.shared.fail_receives) {
            return Err(QueueError::Receive {
                reason: "injected receive failure".into(),
            });
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let arrival = self.shared.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let batch = self.take_ready(max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(MessageBatch::default());
            }
        }
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<(), QueueError> {
        if Self::take_failure(&self.shared.fail_deletes) {
            return Err(QueueError::Delete {
                reason: "injected delete failure".into(),
            });
        }

        let mut state = self.shared.state.lock();
        let mut failed = 0;
        for entry in entries {
            match state.in_flight.remove(entry.handle()) {
                Some(id) => state.deleted.push(id),
                None => failed += 1,
            }
        }
        state.delete_calls.push(entries.len());
        if failed > 0 {
            return Err(QueueError::PartialDelete {
                failed,
                total: entries.len(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_caps_batch_and_issues_handles() {
        let queue = MemoryQueue::new();
        queue.push_all(["a", "b", "c"]);

        let batch = queue.receive(2, Duration::ZERO).await.unwrap();
        let bodies: Vec<&[u8]> = batch.iter().map(|m| m.body().as_ref()).collect();
        assert_eq!(bodies, vec![b"a".as_ref(), b"b".as_ref()]);
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.in_flight_len(), 2);

        queue.delete_batch(&batch.delete_entries()).await.unwrap();
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.deleted().len(), 2);
        assert_eq!(queue.delete_calls(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_returns_empty_after_wait() {
        let queue = MemoryQueue::new();
        let batch = queue.receive(10, Duration::from_secs(10)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn receive_wakes_on_push() {
        let queue = MemoryQueue::new();
        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.receive(10, Duration::from_secs(10)).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.push("late");

        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let queue = MemoryQueue::new();
        queue.fail_next_receives(1);
        queue.push("x");

        assert!(matches!(
            queue.receive(10, Duration::ZERO).await,
            Err(QueueError::Receive { .. })
        ));
        let batch = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);

        queue.fail_next_deletes(1);
        let entries = batch.delete_entries();
        assert!(queue.delete_batch(&entries).await.is_err());
        assert!(queue.delete_batch(&entries).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_unknown_handle_is_partial() {
        let queue = MemoryQueue::new();
        queue.push("x");
        let batch = queue.receive(10, Duration::ZERO).await.unwrap();
        let entries = batch.delete_entries();

        queue.delete_batch(&entries).await.unwrap();
        assert_eq!(
            queue.delete_batch(&entries).await,
            Err(QueueError::PartialDelete {
                failed: 1,
                total: 1
            })
        );
    }
}
