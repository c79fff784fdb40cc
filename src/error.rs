//! Error types used by the queuecast pipeline, its transports and the binary.
//!
//! This module defines four enums:
//!
//! - [`QueueError`]: failures reported by a queue transport (receive, delete, lookup).
//! - [`ConfigError`]: configuration that cannot be loaded or does not validate.
//! - [`HubError`]: requests sent to a hub that has already stopped.
//! - [`RuntimeError`]: startup and shutdown failures of the whole process.
//!
//! Every enum provides `as_label` (a stable snake_case label for logs/metrics).
//! Per-batch queue errors never leave the worker that hit them; only startup
//! failures and shutdown overruns surface as [`RuntimeError`].

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by a queue transport.
///
/// Receive and delete failures are transient: pollers retry receives and ack
/// workers log and drop failed deletes. `Resolve` and `Unsupported` only occur
/// while the process starts.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A receive (long-poll) call failed.
    #[error("receive failed: {reason}")]
    Receive {
        /// Transport-provided failure description.
        reason: String,
    },

    /// A batch-delete call failed as a whole.
    #[error("delete failed: {reason}")]
    Delete {
        /// Transport-provided failure description.
        reason: String,
    },

    /// A batch-delete call succeeded for some entries only.
    #[error("delete rejected {failed} of {total} entries")]
    PartialDelete {
        /// Number of entries the queue refused to delete.
        failed: usize,
        /// Number of entries submitted.
        total: usize,
    },

    /// The queue endpoint could not be resolved from its name.
    #[error("cannot resolve queue {queue:?}: {reason}")]
    Resolve {
        /// Queue name as configured.
        queue: String,
        /// Transport-provided failure description.
        reason: String,
    },

    /// The requested transport is not compiled into this build.
    #[error("queue transport unavailable: {0}")]
    Unsupported(&'static str),
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use queuecast::QueueError;
    ///
    /// let err = QueueError::Receive { reason: "timeout".into() };
    /// assert_eq!(err.as_label(), "queue_receive_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Receive { .. } => "queue_receive_failed",
            QueueError::Delete { .. } => "queue_delete_failed",
            QueueError::PartialDelete { .. } => "queue_delete_partial",
            QueueError::Resolve { .. } => "queue_resolve_failed",
            QueueError::Unsupported(_) => "queue_unsupported",
        }
    }
}

/// # Errors produced while loading or validating configuration.
///
/// Always fatal: the process exits before serving any traffic.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration source could not be read or deserialized.
    #[error("cannot load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A required setting is absent or empty.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A setting is present but outside its accepted range or shape.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending key.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "config_load_failed",
            ConfigError::Missing(_) => "config_missing",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors returned by [`HubHandle`](crate::HubHandle) requests.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The hub event loop has stopped; no registrations are accepted.
    #[error("hub stopped")]
    Stopped,
}

impl HubError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HubError::Stopped => "hub_stopped",
        }
    }
}

/// # Errors produced by the queuecast runtime.
///
/// These are process-level failures: bad configuration, unreachable startup
/// dependencies, a listener that cannot bind, or a shutdown that overran its
/// grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A startup dependency (queue lookup, client construction) failed.
    #[error("startup dependency failed: {0}")]
    Startup(#[source] QueueError),

    /// A pipeline was built without any queue connection.
    #[error("pipeline requires at least one queue connection")]
    NoConnections,

    /// The HTTP listener could not bind.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Address the listener tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// OS signal handlers could not be installed.
    #[error("cannot install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    /// The HTTP server stopped with an error.
    #[error("http server failed: {0}")]
    Server(#[source] std::io::Error),

    /// Shutdown grace period was exceeded; remaining stages were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Stages that were still running when the grace period ended.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use queuecast::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Startup(_) => "runtime_startup_failed",
            RuntimeError::NoConnections => "runtime_no_connections",
            RuntimeError::Bind { .. } => "runtime_bind_failed",
            RuntimeError::Signal(_) => "runtime_signal_failed",
            RuntimeError::Server(_) => "runtime_server_failed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
