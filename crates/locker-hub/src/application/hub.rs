//! The hub: sole owner of all session state.
//!
//! [`Hub`] is constructed once at process start and shared as `Arc<Hub>`
//! between the socket tasks, the monitor timers and the rental layer.  There
//! is no global instance.
//!
//! # Locking
//!
//! The registry, the status cache and the pairing ledger live together in one
//! [`CoreState`] behind a single `tokio::sync::Mutex`.  Compound moves (a
//! device leaving the available set as its connection registers, a socket
//! closing and taking all of its entries with it) therefore happen inside one
//! critical section, and broadcasts are queued before the lock is released:
//! an observer can never see a `status-changed` for a write that has not
//! happened yet.
//!
//! Nothing inside the lock awaits I/O.  Outbound frames go into bounded
//! per-connection queues and hub events go out with `try_send`; neither
//! ever waits for room.
//!
//! The other operations are spread over sibling modules by concern:
//! `dispatch` (commands), `pairing` (discovery and provisioning) and
//! `liveness` (heartbeat and staleness passes).

use std::collections::BTreeSet;
use std::sync::Arc;

use locker_core::{
    decode_inbound, validate_identifier, AvailableDeviceView, ClientHint, Command,
    ConnectionRole, InboundMsg, LockAction, LockerStatus, OutboundMsg, ProtocolError, Reading,
    RecordOutcome, StatusCache, StatusUpdate,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::clock::{Clock, SystemClock};
use crate::application::dispatch::dispatch_locked;
use crate::application::pairing::PairingLedger;
use crate::application::registry::{
    AnnounceInfo, AnnounceOutcome, Registry, RegistryError, Unbound,
};
use crate::domain::{ConnectionHandle, ConnectionId, HubConfig, HubEvent};

/// Everything guarded by the hub lock.
#[derive(Debug, Default)]
pub(crate) struct CoreState {
    pub(crate) registry: Registry,
    pub(crate) status: StatusCache,
    pub(crate) pairings: PairingLedger,
}

/// Device session and command-delivery core.
pub struct Hub {
    pub(crate) state: Mutex<CoreState>,
    pub(crate) config: HubConfig,
    pub(crate) clock: Arc<dyn Clock>,
    events: mpsc::Sender<HubEvent>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Hub {
    /// Creates a hub on the wall clock.
    ///
    /// Returns the hub and the receiving end of its event channel.  Dropping
    /// the receiver is allowed; events are then discarded.
    pub fn new(config: HubConfig) -> (Arc<Self>, mpsc::Receiver<HubEvent>) {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a hub reading time from `clock`.
    pub fn with_clock(
        config: HubConfig,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, mpsc::Receiver<HubEvent>) {
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let hub = Self {
            state: Mutex::new(CoreState::default()),
            config,
            clock,
            events,
        };
        (Arc::new(hub), rx)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Registers a freshly accepted connection and returns its initial role.
    pub async fn attach(&self, handle: ConnectionHandle, hint: ClientHint) -> ConnectionRole {
        let connection_id = handle.id();
        let now = self.clock.now_ms();
        let role = {
            let mut state = self.state.lock().await;
            state.registry.attach(handle, hint, now)
        };
        info!(%connection_id, ?role, ?hint, "connection attached");
        self.emit(HubEvent::ConnectionOpened {
            connection_id,
            role,
        });
        role
    }

    /// Removes every trace of a closed connection.
    ///
    /// Idempotent: a second call finds nothing, broadcasts nothing and emits
    /// nothing.
    pub async fn detach(&self, connection_id: ConnectionId) -> Unbound {
        let mut state = self.state.lock().await;
        let unbound = state.registry.unbind(connection_id);
        if unbound.is_noop() {
            return unbound;
        }

        if let Some(module_id) = &unbound.module_id {
            info!(%connection_id, %module_id, "module disconnected");
            self.emit(HubEvent::ModuleDisconnected {
                module_id: module_id.clone(),
            });
        }
        if !unbound.removed_macs.is_empty() {
            for mac_address in &unbound.removed_macs {
                info!(%connection_id, %mac_address, "unpaired device disconnected");
                self.emit(HubEvent::DeviceLost {
                    mac_address: mac_address.clone(),
                });
            }
            broadcast_available(&state.registry);
        }
        debug!(%connection_id, "connection detached");
        unbound
    }

    // ── Inbound traffic ───────────────────────────────────────────────────────

    /// Decodes one text frame and routes it.
    ///
    /// A malformed frame is answered with an `error` frame to the sender only.
    /// A frame of unknown kind is logged and dropped.  Neither changes state.
    pub async fn handle_frame(&self, connection_id: ConnectionId, text: &str) {
        match decode_inbound(text) {
            Ok(msg) => self.handle_message(connection_id, msg).await,
            Err(ProtocolError::UnknownKind(kind)) => {
                warn!(%connection_id, %kind, "dropping frame of unknown kind");
            }
            Err(err) => {
                warn!(%connection_id, "malformed frame: {err}");
                let state = self.state.lock().await;
                reply(
                    &state.registry,
                    connection_id,
                    OutboundMsg::Error {
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    /// Classifies the connection by the message kind and routes the message.
    pub async fn handle_message(&self, connection_id: ConnectionId, msg: InboundMsg) {
        let kind = msg.kind();
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        let (previous, role) = match state.registry.reclassify(connection_id, kind, now) {
            Ok(roles) => roles,
            Err(err) => {
                warn!(kind = kind.as_wire(), "ignoring message: {err}");
                return;
            }
        };
        if previous != role {
            info!(%connection_id, from = ?previous, to = ?role, "connection reclassified");
        }
        if role == ConnectionRole::Module && kind.is_observer_originated() {
            warn!(
                %connection_id,
                kind = kind.as_wire(),
                "observer request from a module connection dropped"
            );
            return;
        }
        debug!(%connection_id, kind = kind.as_wire(), "inbound message");

        let state = &mut *state;
        match msg {
            InboundMsg::Announce {
                mac_address,
                device_info,
                version,
                capabilities,
            } => {
                if let Err(err) = validate_identifier("macAddress", &mac_address) {
                    warn!(%connection_id, "announce rejected: {err}");
                    reply(
                        &state.registry,
                        connection_id,
                        OutboundMsg::Error {
                            message: err.to_string(),
                        },
                    );
                    return;
                }
                let info = AnnounceInfo {
                    mac_address: mac_address.clone(),
                    device_info,
                    version,
                    capabilities,
                };
                match state.registry.announce(connection_id, info, now) {
                    Ok(AnnounceOutcome::Discovered) => {
                        info!(%connection_id, %mac_address, "device discovered");
                        broadcast_available(&state.registry);
                        self.emit(HubEvent::DeviceDiscovered { mac_address });
                    }
                    Ok(AnnounceOutcome::Refreshed) => {
                        debug!(%connection_id, %mac_address, "device announcement refreshed");
                    }
                    Err(err @ RegistryError::BoundConnection { .. }) => {
                        warn!(%mac_address, "announce ignored: {err}");
                    }
                    Err(err) => warn!("announce failed: {err}"),
                }
            }

            InboundMsg::Register { module_id } => {
                self.register_locked(state, connection_id, module_id, now);
            }

            InboundMsg::HeartbeatPing { module_id } => {
                if state.registry.touch_heartbeat(connection_id, now).is_none() {
                    debug!(%connection_id, %module_id, "heartbeat from unregistered connection");
                }
                reply(
                    &state.registry,
                    connection_id,
                    OutboundMsg::HeartbeatPong { timestamp: now },
                );
            }

            InboundMsg::HeartbeatPong { module_id } => {
                if state.registry.touch_heartbeat(connection_id, now).is_none() {
                    debug!(%connection_id, %module_id, "heartbeat from unregistered connection");
                }
            }

            InboundMsg::Telemetry {
                module_id,
                locker_id,
                lock_state,
                seq,
            } => {
                let update = StatusUpdate {
                    module_id,
                    locker_id,
                    reading: Reading::Lock(lock_state),
                    timestamp: now,
                    seq,
                };
                record_report(state, connection_id, update);
            }

            InboundMsg::OccupancyReport {
                module_id,
                locker_id,
                occupied,
                seq,
            } => {
                let update = StatusUpdate {
                    module_id,
                    locker_id,
                    reading: Reading::Occupancy(occupied),
                    timestamp: now,
                    seq,
                };
                record_report(state, connection_id, update);
            }

            InboundMsg::ConfigAck {
                module_id,
                mac_address,
            } => match state.pairings.confirm(&mac_address, &module_id) {
                Some(_) => {
                    info!(%mac_address, %module_id, "pairing confirmed by device");
                    self.emit(HubEvent::PairingConfirmed {
                        mac_address,
                        module_id,
                    });
                }
                None => debug!(%mac_address, %module_id, "config-ack without pending pairing"),
            },

            InboundMsg::ConfigError {
                module_id,
                mac_address,
                reason,
            } => match state.pairings.reject(&mac_address, &module_id) {
                Some(_) => {
                    warn!(%mac_address, %module_id, ?reason, "pairing rejected by device");
                    self.emit(HubEvent::PairingRejected {
                        mac_address,
                        module_id,
                        reason,
                    });
                }
                None => debug!(%mac_address, %module_id, "config-error without pending pairing"),
            },

            InboundMsg::QueryAvailableDevices => {
                let devices = state.registry.available_views();
                reply(
                    &state.registry,
                    connection_id,
                    OutboundMsg::AvailableDevices { devices },
                );
            }

            InboundMsg::QueryStatus { module_id } => {
                let statuses = state.status.query(module_id.as_deref());
                reply(
                    &state.registry,
                    connection_id,
                    OutboundMsg::StatusSnapshot { statuses },
                );
            }

            InboundMsg::AdminUnlock {
                module_id,
                locker_id,
            } => {
                let command = Command::new(module_id, locker_id, LockAction::Unlock, now);
                let delivered = match dispatch_locked(&state.registry, &command) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%connection_id, "admin unlock not delivered: {err}");
                        false
                    }
                };
                info!(
                    module_id = %command.module_id,
                    locker_id = %command.locker_id,
                    delivered,
                    "admin unlock"
                );
                reply(
                    &state.registry,
                    connection_id,
                    OutboundMsg::CommandResult {
                        module_id: command.module_id,
                        locker_id: command.locker_id,
                        action: command.action,
                        delivered,
                    },
                );
            }
        }
    }

    fn register_locked(
        &self,
        state: &mut CoreState,
        connection_id: ConnectionId,
        module_id: String,
        now: u64,
    ) {
        if let Err(err) = validate_identifier("moduleId", &module_id) {
            warn!(%connection_id, "register rejected: {err}");
            reply(
                &state.registry,
                connection_id,
                OutboundMsg::Error {
                    message: err.to_string(),
                },
            );
            return;
        }

        let registration = match state.registry.register(connection_id, &module_id, now) {
            Ok(registration) => registration,
            Err(err) => {
                warn!("register failed: {err}");
                return;
            }
        };
        state.status.reset_sequences(&module_id);

        if let Some(previous) = registration.previous_module_id {
            info!(%connection_id, %previous, %module_id, "connection changed module identity");
            self.emit(HubEvent::ModuleDisconnected {
                module_id: previous,
            });
        }
        if let Some(old) = registration.superseded {
            warn!(
                %module_id,
                superseded = %old,
                "duplicate register supersedes previous connection"
            );
            if self.config.close_superseded {
                old.close("superseded by a newer registration");
            }
            self.emit(HubEvent::ModuleSuperseded {
                module_id: module_id.clone(),
                connection_id: old.id(),
            });
        }
        if !registration.promoted_macs.is_empty() {
            debug!(macs = ?registration.promoted_macs, %module_id, "device left the available set");
            broadcast_available(&state.registry);
        }

        reply(
            &state.registry,
            connection_id,
            OutboundMsg::RegisteredAck {
                module_id: module_id.clone(),
                timestamp: now,
            },
        );
        info!(%connection_id, %module_id, "module registered");
        self.emit(HubEvent::ModuleRegistered {
            module_id,
            connection_id,
        });
    }

    // ── Queries for the rental layer ──────────────────────────────────────────

    /// Cached locker state, for every module or only `module_id`.
    pub async fn query_status(&self, module_id: Option<&str>) -> Vec<LockerStatus> {
        self.state.lock().await.status.query(module_id)
    }

    /// Overwrites the occupancy of one locker and broadcasts the new entry.
    pub async fn record_status(
        &self,
        module_id: &str,
        locker_id: &str,
        occupied: bool,
    ) -> LockerStatus {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;
        let status = state
            .status
            .record_status(module_id, locker_id, occupied, now);
        broadcast(&state.registry, status.to_change_frame());
        status
    }

    pub async fn is_online(&self, module_id: &str) -> bool {
        self.state.lock().await.registry.is_online(module_id)
    }

    pub async fn list_online_module_ids(&self) -> BTreeSet<String> {
        self.state.lock().await.registry.online_module_ids()
    }

    /// Devices waiting to be paired, ordered by MAC address.
    pub async fn available_devices(&self) -> Vec<AvailableDeviceView> {
        self.state.lock().await.registry.available_views()
    }

    pub async fn role(&self, connection_id: ConnectionId) -> Option<ConnectionRole> {
        self.state.lock().await.registry.role(connection_id)
    }

    /// Number of open observer connections.
    pub async fn observer_count(&self) -> usize {
        self.state.lock().await.registry.observers().len()
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Sends an event without waiting.  A full or closed channel drops it.
    pub(crate) fn emit(&self, event: HubEvent) {
        if let Err(err) = self.events.try_send(event) {
            debug!("hub event dropped: {err}");
        }
    }
}

/// Applies a telemetry or occupancy report sent by a bound module.
fn record_report(state: &mut CoreState, connection_id: ConnectionId, update: StatusUpdate) {
    match state.registry.module_id_of(connection_id) {
        Some(bound) if bound == update.module_id => {}
        bound => {
            warn!(
                %connection_id,
                claimed = %update.module_id,
                bound = ?bound,
                "status report not from the claimed module; dropped"
            );
            return;
        }
    }

    match state.status.record(update) {
        RecordOutcome::Applied(status) => {
            debug!(
                module_id = %status.module_id,
                locker_id = %status.locker_id,
                "status recorded"
            );
            broadcast(&state.registry, status.to_change_frame());
        }
        RecordOutcome::Stale { last_seq } => {
            debug!(%connection_id, last_seq, "stale status report ignored");
        }
    }
}

/// Queues `msg` for every open observer.  Returns how many accepted it.
pub(crate) fn broadcast(registry: &Registry, msg: OutboundMsg) -> usize {
    let observers = registry.observers();
    let delivered = observers
        .iter()
        .filter(|handle| handle.send(msg.clone()))
        .count();
    debug!(kind = msg.type_name(), delivered, "broadcast");
    delivered
}

/// Broadcasts the current available-device list.
pub(crate) fn broadcast_available(registry: &Registry) -> usize {
    broadcast(
        registry,
        OutboundMsg::AvailableDevicesChanged {
            devices: registry.available_views(),
        },
    )
}

/// Sends `msg` to one connection, if it is still attached and open.
pub(crate) fn reply(registry: &Registry, connection_id: ConnectionId, msg: OutboundMsg) -> bool {
    match registry.handle(connection_id) {
        Some(handle) => handle.send(msg),
        None => false,
    }
}
