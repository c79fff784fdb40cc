//! # Process configuration.
//!
//! [`Config`] is read once at startup and never mutated. Sources, lowest
//! priority first:
//! 1. built-in defaults;
//! 2. a YAML file (`-c/--config`);
//! 3. `QUEUECAST_*` environment variables; nested keys use `__`
//!    (`QUEUECAST_RECEIVE__WAIT_TIME_SECS=5`).
//!
//! [`Config::load`] and [`Config::from_yaml_str`] both return a validated and
//! normalized config, or a [`ConfigError`].
//!
//! # Example
//! ```
//! use queuecast::Config;
//!
//! let cfg = Config::from_yaml_str("source_queue: orders\nws_endpoint: /stream\n").unwrap();
//! assert_eq!(cfg.connection_num, 5);
//! assert_eq!(cfg.ws_port, 8080);
//! assert_eq!(cfg.pipeline().receive.max_messages, 10);
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use serde::Deserialize;

use crate::core::{PipelineConfig, ReceiveParams};
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::policies::{BackoffPolicy, JitterPolicy};
use crate::queue::MAX_BATCH_SIZE;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "QUEUECAST";

const DEFAULT_CONNECTIONS: usize = 5;
const MAX_WAIT_TIME_SECS: u64 = 20;

/// Global settings of the bridge.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the source queue (required).
    pub source_queue: String,
    /// Pollers and ack workers each (`0` = 5).
    pub connection_num: usize,
    /// WebSocket route, e.g. `/stream` (required).
    pub ws_endpoint: String,
    /// HTTP listen port.
    pub ws_port: u16,
    /// Queue service region.
    pub region: Option<String>,
    /// Queue service endpoint override (local emulators).
    pub endpoint: Option<String>,
    /// Reserved; parsed and validated but not applied (`0` = 1).
    pub sampling_rate: u32,
    /// Payloads buffered per subscriber before eviction.
    pub subscriber_buffer: usize,
    /// Receive call parameters.
    pub receive: ReceiveSettings,
    /// Batches buffered between pollers and the hub.
    pub receive_queue_capacity: usize,
    /// Batches buffered between the hub and ack workers.
    pub delete_queue_capacity: usize,
    /// Upper bound on pipeline shutdown.
    pub shutdown_grace_secs: u64,
    /// WebSocket connection timers.
    pub ws: WsSettings,
    /// Log line format.
    pub log_format: LogFormat,
}

/// `receive.*` keys.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReceiveSettings {
    pub max_messages: usize,
    pub wait_time_secs: u64,
    pub retry: RetrySettings,
}

/// `receive.retry.*` keys; the default retries immediately.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub jitter: JitterPolicy,
}

/// `ws.*` keys.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WsSettings {
    pub write_timeout_secs: u64,
    pub pong_timeout_secs: u64,
    pub ping_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_queue: String::new(),
            connection_num: DEFAULT_CONNECTIONS,
            ws_endpoint: String::new(),
            ws_port: 8080,
            region: None,
            endpoint: None,
            sampling_rate: 1,
            subscriber_buffer: 256,
            receive: ReceiveSettings::default(),
            receive_queue_capacity: 10_000,
            delete_queue_capacity: 10_000,
            shutdown_grace_secs: 5,
            ws: WsSettings::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: MAX_BATCH_SIZE,
            wait_time_secs: 10,
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            first_ms: 0,
            max_ms: 0,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            write_timeout_secs: 10,
            pong_timeout_secs: 60,
            ping_interval_secs: 54,
        }
    }
}

impl Config {
    /// Reads `path` (YAML), applies environment overrides, then validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = ::config::Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Yaml))
            .add_source(env_overrides())
            .build()?;
        raw.try_deserialize::<Self>()?.validated()
    }

    /// Parses YAML text without consulting the environment, then validates.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw = ::config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        raw.try_deserialize::<Self>()?.validated()
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.source_queue = self.source_queue.trim().to_owned();
        if self.source_queue.is_empty() {
            return Err(ConfigError::Missing("source_queue"));
        }

        self.ws_endpoint = self.ws_endpoint.trim().to_owned();
        if self.ws_endpoint.is_empty() {
            return Err(ConfigError::Missing("ws_endpoint"));
        }
        if !self.ws_endpoint.starts_with('/') {
            return Err(invalid("ws_endpoint", "must start with '/'"));
        }
        if matches!(self.ws_endpoint.as_str(), "/metrics" | "/health") {
            return Err(invalid("ws_endpoint", "collides with a built-in route"));
        }

        if self.connection_num == 0 {
            self.connection_num = DEFAULT_CONNECTIONS;
        }
        if self.sampling_rate == 0 {
            self.sampling_rate = 1;
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.receive.max_messages) {
            return Err(invalid(
                "receive.max_messages",
                format!("must be within 1..={MAX_BATCH_SIZE}"),
            ));
        }
        if self.receive.wait_time_secs > MAX_WAIT_TIME_SECS {
            return Err(invalid(
                "receive.wait_time_secs",
                format!("must be at most {MAX_WAIT_TIME_SECS}"),
            ));
        }
        let retry = &self.receive.retry;
        if !retry.factor.is_finite() || retry.factor < 1.0 {
            return Err(invalid("receive.retry.factor", "must be a finite number >= 1.0"));
        }
        if retry.max_ms < retry.first_ms {
            return Err(invalid("receive.retry.max_ms", "must not be below first_ms"));
        }

        for (field, value) in [
            ("subscriber_buffer", self.subscriber_buffer),
            ("receive_queue_capacity", self.receive_queue_capacity),
            ("delete_queue_capacity", self.delete_queue_capacity),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        if self.ws.write_timeout_secs == 0 {
            return Err(invalid("ws.write_timeout_secs", "must be greater than zero"));
        }
        if self.ws.ping_interval_secs == 0 || self.ws.ping_interval_secs >= self.ws.pong_timeout_secs {
            return Err(invalid(
                "ws.ping_interval_secs",
                "must be non-zero and below ws.pong_timeout_secs",
            ));
        }

        Ok(self)
    }

    /// Stage sizing derived from these settings.
    pub fn pipeline(&self) -> PipelineConfig {
        let retry = &self.receive.retry;
        PipelineConfig {
            receive: ReceiveParams {
                max_messages: self.receive.max_messages,
                wait: Duration::from_secs(self.receive.wait_time_secs),
                retry: BackoffPolicy {
                    first: Duration::from_millis(retry.first_ms),
                    max: Duration::from_millis(retry.max_ms),
                    factor: retry.factor,
                    jitter: retry.jitter,
                },
            },
            receive_queue_capacity: self.receive_queue_capacity,
            delete_queue_capacity: self.delete_queue_capacity,
            subscriber_capacity: self.subscriber_buffer,
        }
    }

    /// Address the HTTP server listens on (all interfaces).
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.ws_port))
    }

    /// Upper bound on pipeline shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Queue connection parameters for the SQS transport.
    #[cfg(feature = "sqs")]
    pub fn sqs_options(&self) -> crate::queue::SqsOptions {
        crate::queue::SqsOptions {
            queue_name: self.source_queue.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl WsSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
