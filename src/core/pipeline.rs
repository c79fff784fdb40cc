//! # Pipeline: wiring and lifecycle of the three stages.
//!
//! ```text
//!   clients[0..N] ──► Poller ×N ──► receive queue ──► Hub ──► delete queue ──► AckWorker ×N
//!                       ▲                               │
//!                  shutdown token                 subscriber buffers
//!                                                       ▲
//!                                   HubHandle (register / unregister / count)
//! ```
//!
//! ## Shutdown order
//! 1. `shutdown` is cancelled; pollers stop receiving and return.
//! 2. The last poller drops its sender; the receive queue closes.
//! 3. The hub broadcasts every batch still queued, forwards each for deletion,
//!    then stops and drops the delete sender, closing every subscriber buffer.
//! 4. Ack workers drain the delete queue and return.
//!
//! Steps 1–4 share one grace period. When it runs out, `abort` is cancelled,
//! every remaining task is aborted and [`RuntimeError::GraceExceeded`] names the
//! stages that were still running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::acker::{AckWorker, SharedDeletes};
use crate::core::hub::{Hub, HubHandle, HubState};
use crate::core::poller::{Poller, ReceiveParams};
use crate::error::RuntimeError;
use crate::metrics::Metrics;
use crate::queue::{MessageBatch, QueueClient};

/// Sizing of the pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Parameters of every receive call.
    pub receive: ReceiveParams,
    /// Batches buffered between pollers and the hub.
    pub receive_queue_capacity: usize,
    /// Batches buffered between the hub and ack workers.
    pub delete_queue_capacity: usize,
    /// Payloads buffered per subscriber before it is evicted.
    pub subscriber_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive: ReceiveParams::default(),
            receive_queue_capacity: 10_000,
            delete_queue_capacity: 10_000,
            subscriber_capacity: 256,
        }
    }
}

/// A configured, not yet started pipeline.
pub struct Pipeline {
    cfg: PipelineConfig,
    clients: Vec<Arc<dyn QueueClient>>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    /// One poller and one ack worker are started per client handle.
    pub fn new(
        cfg: PipelineConfig,
        clients: Vec<Arc<dyn QueueClient>>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, RuntimeError> {
        if clients.is_empty() {
            return Err(RuntimeError::NoConnections);
        }
        Ok(Self {
            cfg,
            clients,
            metrics,
        })
    }

    /// Spawns every stage on the current runtime.
    pub fn start(self) -> RunningPipeline {
        let Self {
            cfg,
            clients,
            metrics,
        } = self;

        let (batch_tx, batch_rx) = mpsc::channel::<MessageBatch>(cfg.receive_queue_capacity.max(1));
        let (delete_tx, delete_rx) = mpsc::channel::<MessageBatch>(cfg.delete_queue_capacity.max(1));
        let deletes: SharedDeletes = Arc::new(Mutex::new(delete_rx));

        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();

        let (hub, handle) = Hub::new(batch_rx, delete_tx, metrics.clone(), cfg.subscriber_capacity);
        let hub_task = tokio::spawn(hub.run());

        let mut pollers = JoinSet::new();
        let mut ackers = JoinSet::new();
        for (id, client) in clients.iter().enumerate() {
            let poller = Poller {
                id,
                client: client.clone(),
                params: cfg.receive,
                batches: batch_tx.clone(),
                metrics: metrics.clone(),
            };
            pollers.spawn(poller.run(shutdown.child_token()));

            let worker = AckWorker {
                id,
                client: client.clone(),
                deletes: deletes.clone(),
                metrics: metrics.clone(),
            };
            ackers.spawn(worker.run(abort.child_token()));
        }
        // Pollers own the only senders from here on.
        drop(batch_tx);

        info!(
            connections = clients.len(),
            receive_queue = cfg.receive_queue_capacity,
            delete_queue = cfg.delete_queue_capacity,
            subscriber_buffer = cfg.subscriber_capacity,
            "pipeline started"
        );

        RunningPipeline {
            hub: handle,
            metrics,
            shutdown,
            abort,
            pollers,
            hub_task,
            ackers,
        }
    }
}

/// Handles to a started pipeline.
pub struct RunningPipeline {
    hub: HubHandle,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    pollers: JoinSet<()>,
    hub_task: JoinHandle<HubState>,
    ackers: JoinSet<()>,
}

impl RunningPipeline {
    /// Request handle to the hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Token cancelled when shutdown begins. Other components (the HTTP
    /// server) can follow it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops every stage in order, waiting at most `grace` overall.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), RuntimeError> {
        info!(?grace, "pipeline shutdown requested");
        self.shutdown.cancel();

        let pollers = &mut self.pollers;
        let hub_task = &mut self.hub_task;
        let ackers = &mut self.ackers;
        let ordered = async {
            while let Some(res) = pollers.join_next().await {
                log_join("poller", res);
            }
            if let Some(state) = log_join("hub", hub_task.await) {
                debug!(?state, "hub joined");
            }
            while let Some(res) = ackers.join_next().await {
                log_join("ack worker", res);
            }
        };

        if tokio::time::timeout(grace, ordered).await.is_ok() {
            info!("pipeline stopped within grace");
            return Ok(());
        }

        let stuck = self.stuck_stages();
        warn!(?grace, ?stuck, "pipeline shutdown exceeded grace; aborting");
        self.abort.cancel();
        self.pollers.abort_all();
        self.hub_task.abort();
        self.ackers.abort_all();
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    fn stuck_stages(&self) -> Vec<String> {
        let mut stuck = Vec::new();
        if !self.pollers.is_empty() {
            stuck.push(format!("pollers[{}]", self.pollers.len()));
        }
        if !self.hub_task.is_finished() {
            stuck.push("hub".to_owned());
        }
        if !self.ackers.is_empty() {
            stuck.push(format!("ack-workers[{}]", self.ackers.len()));
        }
        stuck
    }
}

fn log_join<T>(stage: &'static str, res: Result<T, JoinError>) -> Option<T> {
    match res {
        Ok(out) => Some(out),
        Err(e) => {
            if e.is_panic() {
                error!(stage, error = %e, "pipeline task panicked");
            }
            None
        }
    }
}
