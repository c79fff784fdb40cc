//! # Hub: the single owner of the subscriber set.
//!
//! The [`Hub`] is an actor. One task runs [`Hub::run`] and is the only code that
//! ever touches the subscriber map; everything else talks to it through a
//! [`HubHandle`] (register / unregister / count) or through the receive queue.
//!
//! ## Event loop
//! ```text
//!              ┌──────────── commands (Register / Unregister / Count)
//!              │   biased: commands are served before batches
//!   Hub::run ──┤
//!              └──────────── receive queue (MessageBatch)
//!                               │
//!                               ├─► for message in batch:
//!                               │     for subscriber in set:
//!                               │        offer(payload) ─► Accepted → keep
//!                               │                        └► Full/Closed → evict (drop outbox)
//!                               └─► delete queue.send(batch)   (always, even with 0 subscribers)
//! ```
//!
//! ## States
//! `Running` → `Draining` once the receive queue reports closed. A closed mpsc
//! channel only reports `None` after every buffered batch has been received, so
//! batches queued before shutdown are always broadcast and forwarded for
//! deletion. `Draining` → `Stopped` immediately; the subscriber set is dropped,
//! which closes every remaining outbound buffer.
//!
//! ## Rules
//! - Commands are applied in the order they were sent.
//! - Offers never block: a full buffer evicts its subscriber for good.
//! - Every batch taken from the receive queue is forwarded to the delete queue
//!   exactly once, after it was offered to every subscriber present.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::core::subscriber::{Offer, Outbox, SubscriberId, Subscription, buffer};
use crate::error::HubError;
use crate::metrics::Metrics;
use crate::queue::MessageBatch;

/// Capacity of the hub command channel.
const COMMAND_CAPACITY: usize = 256;

enum Command {
    Register { id: SubscriberId, outbox: Outbox },
    Unregister { id: SubscriberId },
    Count { reply: oneshot::Sender<usize> },
}

/// Lifecycle of the hub event loop; [`Hub::run`] returns the terminal one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HubState {
    /// Serving commands and batches.
    Running,
    /// Receive queue closed; no more batches will arrive.
    Draining,
    /// Terminal: the event loop has returned.
    Stopped,
}

/// Cloneable request handle to a running [`Hub`].
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    subscriber_capacity: usize,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Register { id, .. } => write!(f, "Register({id})"),
            Command::Unregister { id } => write!(f, "Unregister({id})"),
            Command::Count { .. } => write!(f, "Count"),
        }
    }
}

impl HubHandle {
    /// Registers a new subscriber with the default buffer capacity.
    ///
    /// The returned [`Subscription`] yields payloads until the subscriber is
    /// unregistered, evicted, or the hub stops.
    pub async fn register(&self) -> Result<Subscription, HubError> {
        self.register_with_capacity(self.subscriber_capacity).await
    }

    /// Registers a new subscriber whose buffer holds `capacity` payloads (min 1).
    pub async fn register_with_capacity(&self, capacity: usize) -> Result<Subscription, HubError> {
        let (outbox, subscription) = buffer(SubscriberId::next(), capacity);
        let id = subscription.id();
        self.commands
            .send(Command::Register { id, outbox })
            .await
            .map_err(|_| HubError::Stopped)?;
        Ok(subscription)
    }

    /// Removes a subscriber and closes its buffer. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) -> Result<(), HubError> {
        self.commands
            .send(Command::Unregister { id })
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Returns `true` once the hub event loop has returned.
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Number of live subscribers, as seen by the hub after every earlier command.
    pub async fn subscriber_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Count { reply })
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

/// Fan-out actor owning the subscriber set.
pub struct Hub {
    subscribers: HashMap<SubscriberId, Outbox>,
    commands: mpsc::Receiver<Command>,
    batches: mpsc::Receiver<MessageBatch>,
    deletes: mpsc::Sender<MessageBatch>,
    metrics: Arc<Metrics>,
    state: HubState,
}

impl Hub {
    /// Creates a hub reading `batches` and forwarding to `deletes`.
    ///
    /// `subscriber_capacity` is the buffer size used by [`HubHandle::register`].
    pub fn new(
        batches: mpsc::Receiver<MessageBatch>,
        deletes: mpsc::Sender<MessageBatch>,
        metrics: Arc<Metrics>,
        subscriber_capacity: usize,
    ) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let hub = Self {
            subscribers: HashMap::new(),
            commands: rx,
            batches,
            deletes,
            metrics,
            state: HubState::Running,
        };
        let handle = HubHandle {
            commands: tx,
            subscriber_capacity: subscriber_capacity.max(1),
        };
        (hub, handle)
    }

    /// Runs the event loop until the receive queue is closed and drained.
    ///
    /// Returns the terminal state, always [`HubState::Stopped`].
    pub async fn run(mut self) -> HubState {
        debug!("hub started");
        while self.state == HubState::Running {
            tokio::select! {
                biased;
                Some(cmd) = self.commands.recv() => self.apply(cmd),
                batch = self.batches.recv() => match batch {
                    Some(batch) => self.dispatch(batch).await,
                    None => self.transition(HubState::Draining),
                },
            }
        }
        self.transition(HubState::Stopped);
        self.metrics.set_subscribers(0);
        self.state
    }

    fn transition(&mut self, next: HubState) {
        if self.state == next {
            return;
        }
        info!(
            from = ?self.state,
            to = ?next,
            subscribers = self.subscribers.len(),
            "hub state changed"
        );
        self.state = next;
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Register { id, outbox } => {
                debug!(subscriber = %id, "subscriber registered");
                self.subscribers.insert(id, outbox);
            }
            Command::Unregister { id } => {
                if let Some(outbox) = self.subscribers.remove(&id) {
                    debug!(subscriber = %id, "subscriber unregistered");
                    outbox.close();
                }
            }
            Command::Count { reply } => {
                let _ = reply.send(self.subscribers.len());
                return;
            }
        }
        self.metrics.set_subscribers(self.subscribers.len());
    }

    async fn dispatch(&mut self, batch: MessageBatch) {
        self.metrics.record_broadcast(batch.len());

        for message in batch.iter() {
            debug!(
                message_id = message.id(),
                bytes = message.body().len(),
                subscribers = self.subscribers.len(),
                "broadcast message"
            );
            let metrics = &self.metrics;
            self.subscribers
                .retain(|id, outbox| match outbox.offer(message.body().clone()) {
                    Offer::Accepted => true,
                    Offer::Full => {
                        debug!(subscriber = %id, "subscriber buffer full, evicting");
                        metrics.record_eviction();
                        false
                    }
                    Offer::Closed => {
                        debug!(subscriber = %id, "subscriber reader gone, evicting");
                        false
                    }
                });
        }
        self.metrics.set_subscribers(self.subscribers.len());

        if let Err(mpsc::error::SendError(batch)) = self.deletes.send(batch).await {
            warn!(
                messages = batch.len(),
                "delete queue closed; batch left on the queue for redelivery"
            );
        }
    }
}
