//! # Ack worker: deletes broadcast batches from the source queue.
//!
//! N workers share one bounded delete queue. Each takes a batch, maps every
//! message to its delete handle and issues a single batch-delete call.
//!
//! ## Rules
//! - One delete attempt per batch. A failure is logged and counted, never
//!   retried: the queue will redeliver those messages, so subscribers may see
//!   them twice.
//! - Workers exit once the delete queue is closed **and** empty.
//! - `abort` is the hard stop used when shutdown overruns its grace period;
//!   it also interrupts an in-flight delete call.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::metrics::Metrics;
use crate::queue::{MessageBatch, QueueClient};

/// Delete queue shared by every ack worker.
pub(crate) type SharedDeletes = Arc<Mutex<mpsc::Receiver<MessageBatch>>>;

pub(crate) struct AckWorker {
    pub id: usize,
    pub client: Arc<dyn QueueClient>,
    pub deletes: SharedDeletes,
    pub metrics: Arc<Metrics>,
}

impl AckWorker {
    pub async fn run(self, abort: CancellationToken) {
        debug!(worker = self.id, client = self.client.name(), "ack worker started");
        loop {
            let next = {
                let mut rx = self.deletes.lock().await;
                tokio::select! {
                    biased;
                    _ = abort.cancelled() => None,
                    batch = rx.recv() => batch,
                }
            };
            let Some(batch) = next else { break };

            let entries = batch.delete_entries();
            tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    warn!(worker = self.id, messages = entries.len(), "delete abandoned by forced shutdown");
                    break;
                }
                res = self.client.delete_batch(&entries) => match res {
                    Ok(()) => {
                        self.metrics.record_deleted();
                        trace!(worker = self.id, messages = entries.len(), "batch deleted");
                    }
                    Err(e) => {
                        self.metrics.record_delete_error();
                        warn!(
                            worker = self.id,
                            messages = entries.len(),
                            error = %e,
                            label = e.as_label(),
                            "queue delete failed; batch dropped"
                        );
                    }
                },
            }
        }
        debug!(worker = self.id, "ack worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::queue::MemoryQueue;

    async fn received(queue: &MemoryQueue, bodies: &[&'static str]) -> MessageBatch {
        queue.push_all(bodies.iter().copied());
        queue.receive(10, Duration::ZERO).await.unwrap()
    }

    fn workers(
        queue: &MemoryQueue,
        n: usize,
    ) -> (mpsc::Sender<MessageBatch>, Vec<AckWorker>, Arc<Metrics>) {
        let (tx, rx) = mpsc::channel(16);
        let shared: SharedDeletes = Arc::new(Mutex::new(rx));
        let metrics = Arc::new(Metrics::new());
        let ws = (0..n)
            .map(|id| AckWorker {
                id,
                client: Arc::new(queue.clone()),
                deletes: shared.clone(),
                metrics: metrics.clone(),
            })
            .collect();
        (tx, ws, metrics)
    }

    #[tokio::test]
    async fn deletes_each_batch_once_and_exits_on_close() {
        let queue = MemoryQueue::new();
        let (tx, ws, metrics) = workers(&queue, 3);
        let abort = CancellationToken::new();
        let handles: Vec<_> = ws
            .into_iter()
            .map(|w| tokio::spawn(w.run(abort.clone())))
            .collect();

        tx.send(received(&queue, &["a", "b", "c"]).await).await.unwrap();
        tx.send(received(&queue, &["d"]).await).await.unwrap();
        drop(tx);

        for h in handles {
            h.await.unwrap();
        }
        let mut calls = queue.delete_calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![1, 3]);
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(metrics.snapshot().batches_deleted, 2);
    }

    #[tokio::test]
    async fn failed_delete_is_not_retried() {
        let queue = MemoryQueue::new();
        queue.fail_next_deletes(1);
        let (tx, ws, metrics) = workers(&queue, 1);
        let abort = CancellationToken::new();
        let handles: Vec<_> = ws
            .into_iter()
            .map(|w| tokio::spawn(w.run(abort.clone())))
            .collect();

        tx.send(received(&queue, &["lost"]).await).await.unwrap();
        drop(tx);
        for h in handles {
            h.await.unwrap();
        }

        assert!(queue.delete_calls().is_empty());
        assert_eq!(queue.in_flight_len(), 1);
        let s = metrics.snapshot();
        assert_eq!(s.delete_errors, 1);
        assert_eq!(s.batches_deleted, 0);
    }

    #[tokio::test]
    async fn abort_stops_idle_workers() {
        let queue = MemoryQueue::new();
        let (_tx, ws, _) = workers(&queue, 2);
        let abort = CancellationToken::new();
        let handles: Vec<_> = ws
            .into_iter()
            .map(|w| tokio::spawn(w.run(abort.clone())))
            .collect();

        abort.cancel();
        for h in handles {
            h.await.unwrap();
        }
    }
}
