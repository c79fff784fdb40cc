//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination signal.
//!
//! **Unix:** `SIGINT`, `SIGTERM` (systemd/Kubernetes stop), `SIGQUIT`.
//! **Elsewhere:** Ctrl-C via [`tokio::signal::ctrl_c`].

use crate::error::RuntimeError;

/// Waits for a termination signal.
///
/// Fails with [`RuntimeError::Signal`] if the handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).map_err(RuntimeError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(RuntimeError::Signal)?;
    let mut sigquit = signal(SignalKind::quit()).map_err(RuntimeError::Signal)?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = name, "termination signal received");
    Ok(())
}

/// Waits for a termination signal.
///
/// Fails with [`RuntimeError::Signal`] if the handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    tokio::signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
