//! Runtime core: the queue-to-subscriber pipeline.
//!
//! The public entry point is [`Pipeline`]; [`HubHandle`] is how connections
//! join and leave the broadcast.
//!
//! Internal modules:
//! - [`poller`]: one long-poll receive loop per queue connection;
//! - [`hub`]: the actor owning the subscriber set (broadcast, eviction);
//! - [`acker`]: batch-delete workers draining the delete queue;
//! - [`subscriber`]: bounded per-connection outbound buffers;
//! - [`pipeline`]: wiring and ordered shutdown of the stages;
//! - [`shutdown`]: cross-platform termination signal handling.

mod acker;
mod hub;
mod pipeline;
mod poller;
mod shutdown;
mod subscriber;

pub use hub::{Hub, HubHandle, HubState};
pub use pipeline::{Pipeline, PipelineConfig, RunningPipeline};
pub use poller::ReceiveParams;
pub use shutdown::wait_for_shutdown_signal;
pub use subscriber::{SubscriberId, Subscription};
