//! # Pipeline counters
//!
//! [`Metrics`] is shared by every stage through an `Arc`. All updates are
//! relaxed atomic increments; readers take a [`MetricsSnapshot`] or render the
//! Prometheus text format served at `GET /metrics`.
//!
//! | Metric                                 | Type    | Updated by        |
//! |----------------------------------------|---------|-------------------|
//! | `queuecast_message_counter`            | counter | hub, at broadcast |
//! | `queuecast_batches_broadcast_total`    | counter | hub               |
//! | `queuecast_receive_errors_total`       | counter | pollers           |
//! | `queuecast_batches_deleted_total`      | counter | ack workers       |
//! | `queuecast_delete_errors_total`        | counter | ack workers       |
//! | `queuecast_subscribers_evicted_total`  | counter | hub               |
//! | `queuecast_subscribers`                | gauge   | hub               |

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide pipeline counters.
#[derive(Debug, Default)]
pub struct Metrics {
    messages: AtomicU64,
    batches_broadcast: AtomicU64,
    receive_errors: AtomicU64,
    batches_deleted: AtomicU64,
    delete_errors: AtomicU64,
    evictions: AtomicU64,
    subscribers: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages offered to subscribers.
    pub messages: u64,
    /// Batches offered to subscribers.
    pub batches_broadcast: u64,
    /// Failed receive calls.
    pub receive_errors: u64,
    /// Batches acknowledged successfully.
    pub batches_deleted: u64,
    /// Failed (dropped) delete calls.
    pub delete_errors: u64,
    /// Subscribers evicted on overrun.
    pub evictions: u64,
    /// Currently registered subscribers.
    pub subscribers: u64,
}

impl Metrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_broadcast(&self, messages: usize) {
        self.messages.fetch_add(messages as u64, Ordering::Relaxed);
        self.batches_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deleted(&self) {
        self.batches_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete_error(&self) {
        self.delete_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_subscribers(&self, n: usize) {
        self.subscribers.store(n as u64, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            batches_broadcast: self.batches_broadcast.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            batches_deleted: self.batches_deleted.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let rows: [(&str, &str, &str, u64); 7] = [
            (
                "queuecast_message_counter",
                "counter",
                "Number of messages broadcast to subscribers",
                s.messages,
            ),
            (
                "queuecast_batches_broadcast_total",
                "counter",
                "Number of batches broadcast to subscribers",
                s.batches_broadcast,
            ),
            (
                "queuecast_receive_errors_total",
                "counter",
                "Failed queue receive calls",
                s.receive_errors,
            ),
            (
                "queuecast_batches_deleted_total",
                "counter",
                "Batches deleted from the source queue",
                s.batches_deleted,
            ),
            (
                "queuecast_delete_errors_total",
                "counter",
                "Failed batch-delete calls (not retried)",
                s.delete_errors,
            ),
            (
                "queuecast_subscribers_evicted_total",
                "counter",
                "Subscribers evicted because their buffer was full",
                s.evictions,
            ),
            (
                "queuecast_subscribers",
                "gauge",
                "Currently connected subscribers",
                s.subscribers,
            ),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in rows {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} {kind}");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_counts_messages_and_batches() {
        let m = Metrics::new();
        m.record_broadcast(3);
        m.record_broadcast(7);
        m.set_subscribers(2);

        let s = m.snapshot();
        assert_eq!(s.messages, 10);
        assert_eq!(s.batches_broadcast, 2);
        assert_eq!(s.subscribers, 2);
    }

    #[test]
    fn prometheus_text_contains_every_metric() {
        let m = Metrics::new();
        m.record_broadcast(4);
        m.record_eviction();

        let text = m.render_prometheus();
        assert!(text.contains("# TYPE queuecast_message_counter counter\n"));
        assert!(text.contains("\nqueuecast_message_counter 4\n"));
        assert!(text.contains("\nqueuecast_subscribers_evicted_total 1\n"));
        assert!(text.contains("# TYPE queuecast_subscribers gauge\n"));
        assert_eq!(text.lines().count(), 21);
    }
}
