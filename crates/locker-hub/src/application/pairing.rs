//! Discovery and pairing workflow.
//!
//! Each physical device moves through a small state machine keyed by MAC
//! address:
//!
//! ```text
//! unseen ──announce──► announced ──pair──► paired (pending ack)
//!                          │                    │
//!                    stale sweep       config-ack / config-error / timeout
//!                          ▼                    ▼
//!                    stale-evicted        confirmed / rejected / unconfirmed
//! ```
//!
//! Pairing is optimistic.  [`Hub::pair`] sends the `configure` frame, removes
//! the device from the available set and returns.  The device proves success
//! later by answering `config-ack` and registering under the new module id.
//! The [`PairingLedger`] remembers what was sent so those answers can be
//! reported to the rental layer; it never blocks or undoes a pairing.

use std::collections::HashMap;
use std::time::Duration;

use locker_core::{validate_identifier, OutboundMsg};
use thiserror::Error;
use tracing::info;

use crate::application::hub::{broadcast_available, Hub};
use crate::domain::HubEvent;

/// Reasons a pairing request fails.  No state is changed in any of them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    /// The request itself is unusable (bad id, no lockers).
    #[error("invalid pairing request: {0}")]
    InvalidRequest(String),

    /// No device with this MAC address is waiting to be paired.
    #[error("device {0} is not available")]
    NotAvailable(String),

    /// The device is listed but its connection can no longer be written.
    #[error("connection of device {0} is closed")]
    ConnectionClosed(String),
}

/// A configuration sent to a device and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPairing {
    pub mac_address: String,
    pub module_id: String,
    pub locker_ids: Vec<String>,
    /// Unix epoch milliseconds at which `configure` was queued.
    pub sent_at: u64,
}

/// Pairings awaiting the device's answer, keyed by MAC address.
#[derive(Debug, Default)]
pub struct PairingLedger {
    pending: HashMap<String, PendingPairing>,
}

impl PairingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a sent configuration, replacing any older one for the MAC.
    pub fn record(&mut self, pairing: PendingPairing) {
        self.pending.insert(pairing.mac_address.clone(), pairing);
    }

    /// Settles the pairing of `mac_address` if it was for `module_id`.
    pub fn confirm(&mut self, mac_address: &str, module_id: &str) -> Option<PendingPairing> {
        self.settle(mac_address, module_id)
    }

    /// Same matching rule as [`PairingLedger::confirm`], for `config-error`.
    pub fn reject(&mut self, mac_address: &str, module_id: &str) -> Option<PendingPairing> {
        self.settle(mac_address, module_id)
    }

    /// Removes and returns every pairing sent more than `timeout` ago.
    pub fn expire(&mut self, now: u64, timeout: Duration) -> Vec<PendingPairing> {
        let limit = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let expired: Vec<String> = self
            .pending
            .values()
            .filter(|p| now.saturating_sub(p.sent_at) > limit)
            .map(|p| p.mac_address.clone())
            .collect();
        expired
            .iter()
            .filter_map(|mac| self.pending.remove(mac))
            .collect()
    }

    pub fn get(&self, mac_address: &str) -> Option<&PendingPairing> {
        self.pending.get(mac_address)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn settle(&mut self, mac_address: &str, module_id: &str) -> Option<PendingPairing> {
        if self.pending.get(mac_address)?.module_id != module_id {
            return None;
        }
        self.pending.remove(mac_address)
    }
}

/// Locker ids `L01`, `L02`, ... for a module with `count` lockers.
pub fn default_locker_ids(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("L{n:02}")).collect()
}

impl Hub {
    /// Provisions an announced device as `module_id`.
    ///
    /// On success the `configure` frame is queued on the device's connection,
    /// the device leaves the available set, observers receive the new list
    /// and [`HubEvent::DevicePaired`] is emitted.  The call does not wait for
    /// the device to acknowledge.
    ///
    /// # Errors
    ///
    /// - [`PairingError::InvalidRequest`] for a blank or oversized id, or an
    ///   empty locker list.
    /// - [`PairingError::NotAvailable`] if the MAC is not in the available set.
    /// - [`PairingError::ConnectionClosed`] if the device's connection is gone.
    pub async fn pair(
        &self,
        mac_address: &str,
        module_id: &str,
        locker_ids: Vec<String>,
    ) -> Result<(), PairingError> {
        validate_identifier("macAddress", mac_address)
            .and_then(|()| validate_identifier("moduleId", module_id))
            .map_err(|e| PairingError::InvalidRequest(e.to_string()))?;
        if locker_ids.is_empty() {
            return Err(PairingError::InvalidRequest(
                "lockerIds must not be empty".to_string(),
            ));
        }
        for locker_id in &locker_ids {
            validate_identifier("lockerId", locker_id)
                .map_err(|e| PairingError::InvalidRequest(e.to_string()))?;
        }

        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let device = state
            .registry
            .available(mac_address)
            .ok_or_else(|| PairingError::NotAvailable(mac_address.to_string()))?;
        let configure = OutboundMsg::Configure {
            module_id: module_id.to_string(),
            mac_address: mac_address.to_string(),
            locker_ids: locker_ids.clone(),
        };
        if !device.handle.send(configure) {
            return Err(PairingError::ConnectionClosed(mac_address.to_string()));
        }

        state.registry.take_available(mac_address);
        state.pairings.record(PendingPairing {
            mac_address: mac_address.to_string(),
            module_id: module_id.to_string(),
            locker_ids,
            sent_at: now,
        });
        broadcast_available(&state.registry);

        info!(mac_address, module_id, "configuration sent to device");
        self.emit(HubEvent::DevicePaired {
            mac_address: mac_address.to_string(),
            module_id: module_id.to_string(),
        });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
