//! Locker hub: entry point.
//!
//! This binary keeps a live WebSocket to every locker module, serves web
//! dashboards on the same endpoint, and delivers lock/unlock commands on
//! behalf of the rental layer.
//!
//! # Usage
//!
//! ```text
//! locker-hub [OPTIONS]
//!
//! Options:
//!   --config <PATH>                  Optional TOML config file
//!   --ws-bind <ADDR>                 Listener address, e.g. 0.0.0.0:3001
//!   --heartbeat-interval <SECS>      Heartbeat tick period [default: 30]
//!   --heartbeat-timeout <SECS>       Eviction threshold [default: 120]
//!   --discovery-sweep-interval <SECS> Discovery sweep period [default: 10]
//!   --discovery-stale-after <SECS>   Announcement staleness [default: 30]
//!   --pairing-ack-timeout <SECS>     Pairing acknowledgment window [default: 120]
//!   --outbound-queue <FRAMES>        Per-connection queue before cut-off [default: 128]
//!   --keep-superseded                Do not close superseded module connections
//!   --log-level <FILTER>             Filter used when RUST_LOG is unset [default: info]
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then flags.  Every flag can
//! also be set through the environment:
//!
//! | Variable                           | Flag                          |
//! |------------------------------------|-------------------------------|
//! | `LOCKER_CONFIG`                    | `--config`                    |
//! | `LOCKER_WS_BIND`                   | `--ws-bind`                   |
//! | `LOCKER_HEARTBEAT_INTERVAL`        | `--heartbeat-interval`        |
//! | `LOCKER_HEARTBEAT_TIMEOUT`         | `--heartbeat-timeout`         |
//! | `LOCKER_DISCOVERY_SWEEP_INTERVAL`  | `--discovery-sweep-interval`  |
//! | `LOCKER_DISCOVERY_STALE_AFTER`     | `--discovery-stale-after`     |
//! | `LOCKER_PAIRING_ACK_TIMEOUT`       | `--pairing-ack-timeout`       |
//! | `LOCKER_OUTBOUND_QUEUE`            | `--outbound-queue`            |
//! | `LOCKER_KEEP_SUPERSEDED`           | `--keep-superseded`           |
//! | `LOCKER_LOG_LEVEL`                 | `--log-level`                 |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use locker_hub::application::Hub;
use locker_hub::domain::{HubConfig, HubConfigFile, HubEvent};
use locker_hub::infrastructure::{run_server, spawn_monitors};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Device session and command-delivery hub for locker modules.
///
/// Every option is optional; unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "locker-hub",
    about = "Device session and command-delivery hub for locker modules",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "LOCKER_CONFIG")]
    config: Option<PathBuf>,

    /// Address the WebSocket endpoint binds to.
    #[arg(long, env = "LOCKER_WS_BIND")]
    ws_bind: Option<String>,

    /// Seconds between heartbeat ticks.
    #[arg(long, env = "LOCKER_HEARTBEAT_INTERVAL")]
    heartbeat_interval: Option<u64>,

    /// Seconds of silence after which a module is evicted.
    #[arg(long, env = "LOCKER_HEARTBEAT_TIMEOUT")]
    heartbeat_timeout: Option<u64>,

    /// Seconds between discovery sweeps.
    #[arg(long, env = "LOCKER_DISCOVERY_SWEEP_INTERVAL")]
    discovery_sweep_interval: Option<u64>,

    /// Seconds after which a silent announced device is dropped.
    #[arg(long, env = "LOCKER_DISCOVERY_STALE_AFTER")]
    discovery_stale_after: Option<u64>,

    /// Seconds a pairing waits for the device's acknowledgment.
    #[arg(long, env = "LOCKER_PAIRING_ACK_TIMEOUT")]
    pairing_ack_timeout: Option<u64>,

    /// Frames a connection may have queued before it is closed as a slow
    /// consumer.
    #[arg(long, env = "LOCKER_OUTBOUND_QUEUE")]
    outbound_queue: Option<usize>,

    /// Leave superseded module connections open instead of closing them.
    #[arg(long, env = "LOCKER_KEEP_SUPERSEDED")]
    keep_superseded: bool,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "LOCKER_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// The flags as a partial config, applied on top of the file.
    fn overrides(&self) -> HubConfigFile {
        HubConfigFile {
            ws_bind_addr: self.ws_bind.clone(),
            heartbeat_interval_secs: self.heartbeat_interval,
            heartbeat_timeout_secs: self.heartbeat_timeout,
            discovery_sweep_interval_secs: self.discovery_sweep_interval,
            discovery_stale_after_secs: self.discovery_stale_after,
            pairing_ack_timeout_secs: self.pairing_ack_timeout,
            close_superseded: self.keep_superseded.then_some(false),
            event_buffer: None,
            outbound_queue: self.outbound_queue,
            log_level: self.log_level.clone(),
        }
    }

    /// Builds the effective [`HubConfig`]: defaults, then file, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged values are invalid.
    fn into_hub_config(self) -> anyhow::Result<HubConfig> {
        let mut config = HubConfig::default();
        if let Some(path) = &self.config {
            let file = HubConfigFile::load(path)
                .with_context(|| format!("loading config file {}", path.display()))?;
            config = config.apply(file)?;
        }
        config
            .apply(self.overrides())
            .context("invalid command-line configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged with the optional config file.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured `log_level`.
/// 3. The [`Hub`] is constructed, the monitor timers are spawned and an
///    event consumer logs everything the hub reports.
/// 4. A Ctrl+C handler clears the shared `running` flag.
/// 5. [`run_server`] accepts connections until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_hub_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "locker hub starting: ws={}, heartbeat={}s/{}s, discovery stale after {}s",
        config.ws_bind_addr,
        config.heartbeat_interval.as_secs(),
        config.heartbeat_timeout.as_secs(),
        config.discovery_stale_after.as_secs()
    );

    let bind_addr = config.ws_bind_addr;
    let (hub, events) = Hub::new(config);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    spawn_monitors(Arc::clone(&hub), Arc::clone(&running));
    tokio::spawn(log_events(events));

    run_server(bind_addr, hub, running).await?;

    info!("locker hub stopped");
    Ok(())
}

/// Consumes hub events.  The rental layer would persist these; standalone,
/// the hub only logs them.
async fn log_events(mut events: mpsc::Receiver<HubEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "hub event");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_without_flags_yields_default_config() {
        // Arrange
        let cli = Cli::parse_from(["locker-hub"]);

        // Act
        let config = cli.into_hub_config().unwrap();

        // Assert
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_cli_ws_bind_override() {
        let cli = Cli::parse_from(["locker-hub", "--ws-bind", "127.0.0.1:9000"]);
        let config = cli.into_hub_config().unwrap();
        assert_eq!(config.ws_bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_cli_heartbeat_overrides() {
        let cli = Cli::parse_from([
            "locker-hub",
            "--heartbeat-interval",
            "10",
            "--heartbeat-timeout",
            "45",
        ]);
        let config = cli.into_hub_config().unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_cli_keep_superseded_disables_close() {
        let cli = Cli::parse_from(["locker-hub", "--keep-superseded"]);
        let config = cli.into_hub_config().unwrap();
        assert!(!config.close_superseded);
    }

    #[test]
    fn test_cli_outbound_queue_override() {
        let cli = Cli::parse_from(["locker-hub", "--outbound-queue", "16"]);
        let config = cli.into_hub_config().unwrap();
        assert_eq!(config.outbound_queue, 16);
    }

    #[test]
    fn test_cli_rejects_timeout_not_above_interval() {
        let cli = Cli::parse_from(["locker-hub", "--heartbeat-timeout", "30"]);
        assert!(cli.into_hub_config().is_err());
    }

    #[test]
    fn test_cli_invalid_bind_returns_error() {
        // Arrange: not a socket address
        let cli = Cli {
            ws_bind: Some("not.an.addr".to_string()),
            ..Cli::default()
        };

        // Act
        let result = cli.into_hub_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/no/such/locker-hub.toml")),
            ..Cli::default()
        };
        let err = cli.into_hub_config().unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/locker-hub.toml"));
    }
}
