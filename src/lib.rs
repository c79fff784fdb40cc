//! # queuecast
//!
//! **queuecast** bridges a pull-based message queue to live WebSocket
//! subscribers. It long-polls the queue with a pool of pollers, fans every
//! message out to all connected subscribers, evicts subscribers that cannot
//! keep up, and deletes each batch from the queue once it has been offered.
//!
//! Delivery is best-effort toward subscribers and at-least-once toward the
//! queue: a batch is deleted after broadcast whether or not anyone received it,
//! and a failed delete leaves it for redelivery.
//!
//! ## Architecture
//! ```text
//!   ┌──────────┐ ┌──────────┐     ┌──────────┐
//!   │ Poller 0 │ │ Poller 1 │ ... │ Poller N │   long-poll receive, retry policy
//!   └────┬─────┘ └────┬─────┘     └────┬─────┘
//!        └────────────┼────────────────┘
//!                     ▼
//!            receive queue (bounded, backpressure on pollers)
//!                     ▼
//!   ┌───────────────────────────────────────────┐   commands from HubHandle:
//!   │ Hub (single actor, owns subscriber set)   │◄── Register / Unregister / Count
//!   │  offer each payload to every buffer       │
//!   │  full buffer ─► evict                     │
//!   └───────┬───────────────────────┬───────────┘
//!           ▼                       ▼
//!   subscriber buffers        delete queue (bounded)
//!   (one per WebSocket)             ▼
//!                           ┌────────────┐     ┌────────────┐
//!                           │ AckWorker 0│ ... │ AckWorker N│   one batch-delete per batch
//!                           └────────────┘     └────────────┘
//! ```
//!
//! ## Features
//! | Area          | Description                                           | Key types                              |
//! |---------------|-------------------------------------------------------|----------------------------------------|
//! | **Pipeline**  | Poller/hub/ack-worker wiring and ordered shutdown     | [`Pipeline`], [`RunningPipeline`]      |
//! | **Hub**       | Subscriber registration and bounded fan-out           | [`HubHandle`], [`Subscription`]        |
//! | **Transports**| Queue abstraction plus in-process and SQS backends    | [`QueueClient`], [`MemoryQueue`]       |
//! | **Policies**  | Delay between failed receive calls                    | [`BackoffPolicy`], [`JitterPolicy`]    |
//! | **Server**    | WebSocket, `/metrics` and `/health` routes            | [`server::router`], [`server::serve`]  |
//! | **Errors**    | Typed errors with stable labels                       | [`QueueError`], [`RuntimeError`]       |
//!
//! ## Optional features
//! - `sqs`: Amazon SQS transport ([`SqsQueue`]), used by the binary.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use queuecast::{MemoryQueue, Metrics, Pipeline, PipelineConfig, QueueClient};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = MemoryQueue::new();
//!     let clients: Vec<Arc<dyn QueueClient>> = vec![Arc::new(queue.clone())];
//!
//!     let running = Pipeline::new(PipelineConfig::default(), clients, Arc::new(Metrics::new()))?
//!         .start();
//!
//!     let mut sub = running.hub().register().await?;
//!     queue.push("hello");
//!     assert_eq!(sub.recv().await.as_deref(), Some(&b"hello"[..]));
//!
//!     running.shutdown(std::time::Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod logging;
mod metrics;
mod policies;
mod queue;

pub mod server;

// ---- Public re-exports ----

pub use crate::config::{Config, ENV_PREFIX, ReceiveSettings, RetrySettings, WsSettings};
pub use crate::core::{
    Hub, HubHandle, HubState, Pipeline, PipelineConfig, ReceiveParams, RunningPipeline,
    SubscriberId, Subscription, wait_for_shutdown_signal,
};
pub use crate::error::{ConfigError, HubError, QueueError, RuntimeError};
pub use crate::logging::{LogFormat, init_logging};
pub use crate::metrics::{Metrics, MetricsSnapshot};
pub use crate::policies::{BackoffPolicy, JitterPolicy};
pub use crate::queue::{
    DeleteEntry, DeleteHandle, MAX_BATCH_SIZE, MemoryQueue, MessageBatch, QueueClient,
    QueueMessage,
};

#[cfg(feature = "sqs")]
pub use crate::queue::{SqsOptions, SqsQueue};
