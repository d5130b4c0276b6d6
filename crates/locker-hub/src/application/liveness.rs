//! Liveness monitor passes.
//!
//! Two independent passes, each driven by its own timer in
//! `infrastructure::monitor`:
//!
//! - **Heartbeat tick** (reference: every 30 s).  A module silent for longer
//!   than `heartbeat_timeout` is evicted and its connection force-closed;
//!   every other module is probed with `heartbeat-ping`.  Up to
//!   `timeout - interval` of staleness goes unnoticed.  The same tick closes
//!   module-class connections that never took an identity and have sent
//!   nothing for `heartbeat_timeout`.
//! - **Discovery sweep** (reference: every 10 s).  Announced devices whose
//!   `lastSeen` is older than `discovery_stale_after` leave the available
//!   set.  Devices are never probed; announcements are push-only.  The same
//!   pass gives up on pairings the device never answered.
//!
//! Both passes take the hub lock once and do all their work inside it.

use locker_core::OutboundMsg;
use tracing::{debug, info, warn};

use crate::application::hub::{broadcast_available, Hub};
use crate::domain::{ConnectionId, HubEvent};

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    /// Module ids removed for missing the heartbeat window.
    pub evicted: Vec<String>,
    /// Number of modules a probe was queued for.
    pub probed: usize,
    /// Module-class connections closed for never registering.
    pub closed_idle: Vec<ConnectionId>,
}

/// Outcome of one discovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// MAC addresses that aged out of the available set.
    pub expired: Vec<String>,
    /// MAC addresses whose pairing was never acknowledged.
    pub unconfirmed: Vec<String>,
}

impl Hub {
    /// Runs one heartbeat pass.
    pub async fn heartbeat_tick(&self) -> LivenessReport {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let mut evicted: Vec<String> = Vec::new();
        for module in state
            .registry
            .evict_expired_modules(now, self.config.heartbeat_timeout)
        {
            info!(
                module_id = %module.module_id,
                silent_ms = now.saturating_sub(module.last_heartbeat),
                "module missed heartbeat window; evicting"
            );
            module.handle.close("heartbeat timeout");
            self.emit(HubEvent::ModuleEvicted {
                module_id: module.module_id.clone(),
            });
            evicted.push(module.module_id);
        }
        evicted.sort();

        let probed = state
            .registry
            .module_handles()
            .into_iter()
            .filter(|(module_id, handle)| {
                let sent = handle.send(OutboundMsg::HeartbeatPing { timestamp: now });
                if !sent {
                    debug!(%module_id, "heartbeat probe not queued; connection closing");
                }
                sent
            })
            .count();

        let mut closed_idle = Vec::new();
        for handle in state
            .registry
            .idle_module_sessions(now, self.config.heartbeat_timeout)
        {
            info!(
                connection_id = %handle.id(),
                "module connection never registered; closing"
            );
            handle.close("no module identity");
            closed_idle.push(handle.id());
        }
        closed_idle.sort();

        LivenessReport {
            evicted,
            probed,
            closed_idle,
        }
    }

    /// Runs one discovery staleness pass.
    pub async fn discovery_sweep(&self) -> DiscoveryReport {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let mut expired: Vec<String> = state
            .registry
            .evict_stale_available(now, self.config.discovery_stale_after)
            .into_iter()
            .map(|device| device.mac_address)
            .collect();
        if !expired.is_empty() {
            expired.sort();
            for mac_address in &expired {
                info!(%mac_address, "device stopped announcing; removed from available set");
                self.emit(HubEvent::DeviceExpired {
                    mac_address: mac_address.clone(),
                });
            }
            broadcast_available(&state.registry);
        }

        let mut unconfirmed = Vec::new();
        for pairing in state
            .pairings
            .expire(now, self.config.pairing_ack_timeout)
        {
            warn!(
                mac_address = %pairing.mac_address,
                module_id = %pairing.module_id,
                "pairing not acknowledged in time"
            );
            self.emit(HubEvent::PairingUnconfirmed {
                mac_address: pairing.mac_address.clone(),
                module_id: pairing.module_id,
            });
            unconfirmed.push(pairing.mac_address);
        }
        unconfirmed.sort();

        DiscoveryReport {
            expired,
            unconfirmed,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
