//! Receive retry policy.
//!
//! Pollers retry failed receive calls forever; these knobs only decide how long
//! they wait in between.
//!
//! ## Contents
//! - [`BackoffPolicy`] how the delay evolves with consecutive failures
//! - [`JitterPolicy`]  randomization to keep pollers from retrying in lock-step
//!
//! ## Defaults
//! - `BackoffPolicy::immediate()` → retry at once (the scheduler is still yielded to).
//! - `JitterPolicy::None`.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
