//! Hub configuration types.
//!
//! [`HubConfig`] is the single source of truth for all runtime settings.  It
//! is assembled in three layers, lowest precedence first:
//!
//! 1. [`HubConfig::default`] – the reference timings.
//! 2. An optional TOML file, parsed into [`HubConfigFile`].
//! 3. CLI flags / `LOCKER_*` environment variables, which `main.rs` also
//!    expresses as a [`HubConfigFile`] and applies last.
//!
//! Every key of the file is optional, so a file only needs to mention what it
//! changes:
//!
//! ```toml
//! ws_bind_addr = "0.0.0.0:3001"
//! heartbeat_interval_secs = 30
//! heartbeat_timeout_secs = 120
//! discovery_stale_after_secs = 30
//! close_superseded = true
//! log_level = "info"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::connection::DEFAULT_OUTBOUND_QUEUE;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value was parsed but is not acceptable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All runtime configuration for the hub.
///
/// Build this once at startup and hand it to `Hub::new`; the hub keeps its
/// own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Address the shared module/observer WebSocket endpoint binds to.
    pub ws_bind_addr: SocketAddr,

    /// How often registered modules are probed and checked for staleness.
    pub heartbeat_interval: Duration,

    /// A module whose last heartbeat is older than this is evicted on the
    /// next tick.  Must exceed `heartbeat_interval`.
    pub heartbeat_timeout: Duration,

    /// How often the unpaired-device table is swept.
    pub discovery_sweep_interval: Duration,

    /// An announced device not heard from for longer than this is dropped
    /// from the available list.
    pub discovery_stale_after: Duration,

    /// How long a sent pairing configuration waits for `config-ack` before
    /// it is reported as unconfirmed.
    pub pairing_ack_timeout: Duration,

    /// Force-close a module connection superseded by a newer `register` for
    /// the same module id.
    pub close_superseded: bool,

    /// Capacity of the hub event channel.
    pub event_buffer: usize,

    /// Frames a connection may have queued before it is closed as a slow
    /// consumer.
    pub outbound_queue: usize,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for HubConfig {
    /// | Field                     | Default         |
    /// |---------------------------|-----------------|
    /// | ws_bind_addr              | `0.0.0.0:3001`  |
    /// | heartbeat_interval        | 30 seconds      |
    /// | heartbeat_timeout         | 120 seconds     |
    /// | discovery_sweep_interval  | 10 seconds      |
    /// | discovery_stale_after     | 30 seconds      |
    /// | pairing_ack_timeout       | 120 seconds     |
    /// | close_superseded          | `true`          |
    /// | event_buffer              | 256             |
    /// | outbound_queue            | 128             |
    /// | log_level                 | `"info"`        |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(120),
            discovery_sweep_interval: Duration::from_secs(10),
            discovery_stale_after: Duration::from_secs(30),
            pairing_ack_timeout: Duration::from_secs(120),
            close_superseded: true,
            event_buffer: 256,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            log_level: "info".to_string(),
        }
    }
}

/// Partial configuration: the TOML file schema, also used for CLI overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfigFile {
    pub ws_bind_addr: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
    pub heartbeat_timeout_secs: Option<u64>,
    pub discovery_sweep_interval_secs: Option<u64>,
    pub discovery_stale_after_secs: Option<u64>,
    pub pairing_ack_timeout_secs: Option<u64>,
    pub close_superseded: Option<bool>,
    pub event_buffer: Option<usize>,
    pub outbound_queue: Option<usize>,
    pub log_level: Option<String>,
}

impl HubConfigFile {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on syntax errors or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl HubConfig {
    /// Returns a copy of `self` with every value present in `overrides`
    /// replaced, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable bind address or a
    /// combination rejected by [`HubConfig::validate`].
    pub fn apply(mut self, overrides: HubConfigFile) -> Result<Self, ConfigError> {
        if let Some(addr) = overrides.ws_bind_addr {
            self.ws_bind_addr = addr
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid ws_bind_addr '{addr}'")))?;
        }
        if let Some(secs) = overrides.heartbeat_interval_secs {
            self.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.heartbeat_timeout_secs {
            self.heartbeat_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.discovery_sweep_interval_secs {
            self.discovery_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.discovery_stale_after_secs {
            self.discovery_stale_after = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.pairing_ack_timeout_secs {
            self.pairing_ack_timeout = Duration::from_secs(secs);
        }
        if let Some(close) = overrides.close_superseded {
            self.close_superseded = close;
        }
        if let Some(buffer) = overrides.event_buffer {
            self.event_buffer = buffer;
        }
        if let Some(queue) = overrides.outbound_queue {
            self.outbound_queue = queue;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any interval is zero, if the
    /// heartbeat timeout does not exceed the interval, or if the event buffer
    /// or the outbound queue is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("discovery_sweep_interval", self.discovery_sweep_interval),
            ("discovery_stale_after", self.discovery_stale_after),
            ("pairing_ack_timeout", self.pairing_ack_timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(ConfigError::Invalid(format!(
                "heartbeat_timeout ({}s) must exceed heartbeat_interval ({}s)",
                self.heartbeat_timeout.as_secs(),
                self.heartbeat_interval.as_secs()
            )));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be non-zero".into()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be non-zero".into()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
