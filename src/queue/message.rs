//! # Messages and batches as received from the source queue.
//!
//! A [`MessageBatch`] is produced by one receive call and then moves, by value,
//! through the pipeline: poller → receive queue → hub → delete queue → ack worker.
//! It is never cloned, so at most one stage holds it at any time.

use bytes::Bytes;

/// Opaque queue-specific token required to acknowledge one message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeleteHandle(String);

impl DeleteHandle {
    /// Wraps a transport-provided receipt token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One message: its queue-assigned id, raw payload and delete handle.
#[derive(Debug)]
pub struct QueueMessage {
    id: String,
    body: Bytes,
    handle: DeleteHandle,
}

impl QueueMessage {
    /// Creates a message from its parts.
    pub fn new(id: impl Into<String>, body: impl Into<Bytes>, handle: DeleteHandle) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            handle,
        }
    }

    /// Queue-assigned message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw payload. Cloning the returned [`Bytes`] is cheap (reference counted).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Delete handle for this delivery.
    pub fn handle(&self) -> &DeleteHandle {
        &self.handle
    }
}

/// Entry of a batch-delete call: message id plus its delete handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteEntry {
    id: String,
    handle: DeleteHandle,
}

impl DeleteEntry {
    /// Message id (used by transports to correlate per-entry results).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delete handle to acknowledge.
    pub fn handle(&self) -> &DeleteHandle {
        &self.handle
    }
}

/// Ordered, immutable group of messages returned by one receive call.
#[derive(Debug, Default)]
pub struct MessageBatch {
    messages: Vec<QueueMessage>,
}

impl MessageBatch {
    /// Creates a batch preserving the given order.
    pub fn new(messages: Vec<QueueMessage>) -> Self {
        Self { messages }
    }

    /// Number of messages in the batch.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the receive call returned nothing.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterates over messages in receive order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueMessage> {
        self.messages.iter()
    }

    /// Maps every message to its delete entry, in receive order.
    pub fn delete_entries(&self) -> Vec<DeleteEntry> {
        self.messages
            .iter()
            .map(|m| DeleteEntry {
                id: m.id.clone(),
                handle: m.handle.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_entries_follow_message_order() {
        let batch = MessageBatch::new(vec![
            QueueMessage::new("a", "one", DeleteHandle::new("h-a")),
            QueueMessage::new("b", "two", DeleteHandle::new("h-b")),
        ]);

        let entries = batch.delete_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id(), "a");
        assert_eq!(entries[0].handle().as_str(), "h-a");
        assert_eq!(entries[1].id(), "b");
        assert_eq!(entries[1].handle().as_str(), "h-b");
        assert_eq!(batch.len(), 2);
    }
}
