//! Source queue: message model and transports.
//!
//! ## Contents
//! - [`MessageBatch`], [`QueueMessage`], [`DeleteHandle`], [`DeleteEntry`] the data model
//! - [`QueueClient`] the transport contract used by pollers and ack workers
//! - [`MemoryQueue`] in-process transport (tests, demos)
//! - `SqsQueue` Amazon SQS transport (feature `sqs`)

mod client;
mod memory;
mod message;
#[cfg(feature = "sqs")]
mod sqs;

pub use client::{MAX_BATCH_SIZE, QueueClient};
pub use memory::MemoryQueue;
pub use message::{DeleteEntry, DeleteHandle, MessageBatch, QueueMessage};
#[cfg(feature = "sqs")]
pub use sqs::{SqsOptions, SqsQueue};
