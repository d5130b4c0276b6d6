//! Timers driving the liveness passes.
//!
//! Two tasks run independently of message handling: the heartbeat tick and
//! the discovery sweep.  Each pass takes the hub lock like any other
//! operation, so timers and socket traffic never interleave inside a
//! critical section.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::Hub;

/// Spawns the heartbeat and discovery timers.
///
/// Both stop at their next tick after `running` is cleared.
pub fn spawn_monitors(hub: Arc<Hub>, running: Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
    let heartbeat = {
        let hub = Arc::clone(&hub);
        let period = hub.config().heartbeat_interval;
        tokio::spawn(every(period, Arc::clone(&running), move || {
            let hub = Arc::clone(&hub);
            async move {
                let report = hub.heartbeat_tick().await;
                debug!(
                    probed = report.probed,
                    evicted = report.evicted.len(),
                    closed_idle = report.closed_idle.len(),
                    "heartbeat tick"
                );
            }
        }))
    };

    let discovery = {
        let period = hub.config().discovery_sweep_interval;
        tokio::spawn(every(period, running, move || {
            let hub = Arc::clone(&hub);
            async move {
                let report = hub.discovery_sweep().await;
                if !report.expired.is_empty() || !report.unconfirmed.is_empty() {
                    debug!(
                        expired = report.expired.len(),
                        unconfirmed = report.unconfirmed.len(),
                        "discovery sweep"
                    );
                }
            }
        }))
    };

    vec![heartbeat, discovery]
}

/// Runs `pass` once per `period` until `running` is cleared.
///
/// The interval's first tick completes immediately and is skipped, so the
/// first pass happens one full period after start.
async fn every<F, Fut>(period: Duration, running: Arc<AtomicBool>, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            info!("monitor stopping");
            break;
        }
        pass().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
