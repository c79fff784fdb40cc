//! # Subscriber buffers
//!
//! Every live connection owns a bounded FIFO of outbound payloads, split in two:
//! - [`Outbox`]: the write side, held **only** by the hub;
//! - [`Subscription`]: the read side, drained by the connection's writer loop.
//!
//! ## Rules
//! - **Non-blocking offer**: [`Outbox::offer`] uses `try_send`; it reports a full
//!   buffer instead of waiting.
//! - **Close = drop the outbox**: [`Outbox::close`] consumes it, so a buffer
//!   can be closed at most once. The writer then drains what is left and
//!   observes `None`.
//! - **Per-subscriber FIFO**: payloads come out in offer order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Global sequence for subscriber identities.
static SUBSCRIBER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of one live connection. Unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        Self(SUBSCRIBER_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Result of a non-blocking offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Payload queued.
    Accepted,
    /// Buffer at capacity; payload dropped.
    Full,
    /// The reading side is gone; payload dropped.
    Closed,
}

/// Hub-side handle of a subscriber buffer.
#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
}

impl Outbox {
    /// Attempts to queue `payload` without waiting.
    pub fn offer(&self, payload: Bytes) -> Offer {
        match self.tx.try_send(payload) {
            Ok(()) => Offer::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => Offer::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Closes the buffer: no more payloads will arrive.
    pub fn close(self) {
        drop(self);
    }
}

/// Writer-side handle of a subscriber buffer.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    /// Identity registered with the hub.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next payload in offer order; `None` once the hub has closed the buffer
    /// and everything queued before has been drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Creates a buffer of `capacity` payloads (minimum 1).
pub fn buffer(id: SubscriberId, capacity: usize) -> (Outbox, Subscription) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Outbox { tx }, Subscription { id, rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offer_reports_full_without_blocking() {
        let (outbox, mut sub) = buffer(SubscriberId::next(), 1);
        assert_eq!(outbox.offer(Bytes::from_static(b"a")), Offer::Accepted);
        assert_eq!(outbox.offer(Bytes::from_static(b"b")), Offer::Full);

        outbox.close();
        assert_eq!(sub.recv().await.as_deref(), Some(&b"a"[..]));
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn offer_reports_closed_reader() {
        let (outbox, sub) = buffer(SubscriberId::next(), 4);
        drop(sub);
        assert_eq!(outbox.offer(Bytes::from_static(b"a")), Offer::Closed);
    }

    #[test]
    fn ids_are_unique() {
        let a = SubscriberId::next();
        let b = SubscriberId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sub-"));
    }
}
