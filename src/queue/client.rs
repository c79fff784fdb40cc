//! # Queue transport contract
//!
//! `QueueClient` is the seam between the pipeline and a concrete pull-based
//! queue. Each pool worker owns its own client handle; all handles address the
//! same queue endpoint, resolved once at startup.
//!
//! ## Contract
//! - `receive` is a long-poll: it may block server-side for up to `wait` and may
//!   return an empty batch. It must not return more than `max_messages`.
//! - `delete_batch` acknowledges the given entries with a single call.
//! - Both calls must be cancel-safe: the pipeline drops the future when shutdown
//!   is requested.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::queue::{DeleteEntry, MessageBatch};

/// Upper bound on messages per receive call (the batch cap).
pub const MAX_BATCH_SIZE: usize = 10;

/// Contract for pull-based queue transports.
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    /// Long-polls for up to `max_messages` messages, waiting at most `wait`.
    async fn receive(&self, max_messages: usize, wait: Duration)
        -> Result<MessageBatch, QueueError>;

    /// Deletes (acknowledges) every entry in one call.
    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<(), QueueError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
