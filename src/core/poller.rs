//! # Poller: one long-poll receive loop.
//!
//! ```text
//! loop {
//!   ├─► receive(max_messages, wait)        (cancellable)
//!   │     ├─ Err   → count, warn, sleep(retry.next(failures, prev)) (cancellable), continue
//!   │     ├─ empty → continue
//!   │     └─ batch → receive_queue.send(batch)  (blocks when full = backpressure, cancellable)
//!   └─ exit: shutdown token cancelled, or receive queue closed
//! }
//! ```
//!
//! A batch dropped because shutdown interrupted its hand-off was never
//! deleted; the queue redelivers it later.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::metrics::Metrics;
use crate::policies::BackoffPolicy;
use crate::queue::{MessageBatch, QueueClient};

/// Parameters of every receive call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReceiveParams {
    /// Batch cap per call (1..=10).
    pub max_messages: usize,
    /// Server-side long-poll wait.
    pub wait: Duration,
    /// Delay policy after failed calls.
    pub retry: BackoffPolicy,
}

impl Default for ReceiveParams {
    fn default() -> Self {
        Self {
            max_messages: crate::queue::MAX_BATCH_SIZE,
            wait: Duration::from_secs(10),
            retry: BackoffPolicy::immediate(),
        }
    }
}

/// One receive loop bound to its own client handle.
pub(crate) struct Poller {
    pub id: usize,
    pub client: Arc<dyn QueueClient>,
    pub params: ReceiveParams,
    pub batches: mpsc::Sender<MessageBatch>,
    pub metrics: Arc<Metrics>,
}

impl Poller {
    /// Runs until `shutdown` is cancelled or the receive queue closes.
    pub async fn run(self, shutdown: CancellationToken) {
        debug!(poller = self.id, client = self.client.name(), "poller started");
        let mut failures: u32 = 0;
        let mut prev_delay = Duration::ZERO;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                res = self.client.receive(self.params.max_messages, self.params.wait) => res,
            };

            match received {
                Ok(batch) if batch.is_empty() => {
                    failures = 0;
                    prev_delay = Duration::ZERO;
                    trace!(poller = self.id, "empty receive");
                }
                Ok(batch) => {
                    failures = 0;
                    prev_delay = Duration::ZERO;
                    let n = batch.len();
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            debug!(
                                poller = self.id,
                                messages = n,
                                "shutdown during hand-off; batch left for redelivery"
                            );
                            break;
                        }
                        sent = self.batches.send(batch) => {
                            if sent.is_err() {
                                debug!(poller = self.id, "receive queue closed");
                                break;
                            }
                            trace!(poller = self.id, messages = n, "batch queued");
                        }
                    }
                }
                Err(e) => {
                    self.metrics.record_receive_error();
                    let delay = self.params.retry.next(failures, prev_delay);
                    failures = failures.saturating_add(1);
                    prev_delay = delay;
                    warn!(
                        poller = self.id,
                        error = %e,
                        label = e.as_label(),
                        failures,
                        retry_in = ?delay,
                        "queue receive failed"
                    );
                    if !self.pause(delay, &shutdown).await {
                        break;
                    }
                }
            }
        }
        debug!(poller = self.id, "poller stopped");
    }

    /// Waits `delay` (or just yields when zero). Returns `false` if cancelled.
    async fn pause(&self, delay: Duration, shutdown: &CancellationToken) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !shutdown.is_cancelled();
        }
        tokio::select! {
            _ = time::sleep(delay) => true,
            _ = shutdown.cancelled() => false,
        }
    }
}
