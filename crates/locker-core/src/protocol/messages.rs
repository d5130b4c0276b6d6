//! JSON message types for the shared module/observer WebSocket endpoint.
//!
//! Locker modules and web observers connect to the same listening socket, so
//! every message that can travel over it is defined here as a member of one of
//! two closed enums:
//!
//! ```text
//! Module / Observer → Hub:  JSON text frame  →  InboundMsg
//! Hub → Module / Observer:  OutboundMsg      →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field in kebab-case that
//! identifies the variant.  Payload fields are flattened into the same object
//! and use camelCase, matching the names the module firmware already emits:
//!
//! ```json
//! {"type":"occupancy-report","moduleId":"mod-1","lockerId":"L01","occupied":true}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Why separate inbound and outbound message types?
//!
//! The two directions carry different information.  Modules *report*
//! (announce, register, telemetry) and observers *query*; the hub *commands*
//! and *broadcasts*.  Two distinct enums make it a compile-time error to send
//! an inbound-only message to a connection.

use serde::{Deserialize, Serialize};

use crate::domain::status::LockerStatus;

// ── Shared value types ────────────────────────────────────────────────────────

/// The action carried by a lock/unlock command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockAction {
    Lock,
    Unlock,
}

impl LockAction {
    /// Returns the wire spelling (`"lock"` / `"unlock"`).
    pub fn as_str(self) -> &'static str {
        match self {
            LockAction::Lock => "lock",
            LockAction::Unlock => "unlock",
        }
    }
}

/// The physical bolt state a module reports in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Observer-facing view of a device that announced itself but is not yet
/// bound to a module identity.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDeviceView {
    pub mac_address: String,
    pub device_info: String,
    pub version: String,
    pub capabilities: u32,
    pub discovered_at: u64,
    pub last_seen: u64,
}

// ── Message kinds ─────────────────────────────────────────────────────────────

/// The closed set of inbound message kinds.
///
/// The classifier works on kinds rather than full messages, so it can be
/// exercised without building payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Announce,
    Register,
    HeartbeatPing,
    HeartbeatPong,
    Telemetry,
    OccupancyReport,
    ConfigAck,
    ConfigError,
    QueryAvailableDevices,
    QueryStatus,
    AdminUnlock,
}

impl MessageKind {
    /// Every inbound kind, in wire-table order.
    pub const ALL: [MessageKind; 11] = [
        MessageKind::Announce,
        MessageKind::Register,
        MessageKind::HeartbeatPing,
        MessageKind::HeartbeatPong,
        MessageKind::Telemetry,
        MessageKind::OccupancyReport,
        MessageKind::ConfigAck,
        MessageKind::ConfigError,
        MessageKind::QueryAvailableDevices,
        MessageKind::QueryStatus,
        MessageKind::AdminUnlock,
    ];

    /// Returns the `"type"` discriminant used on the wire.
    pub fn as_wire(self) -> &'static str {
        match self {
            MessageKind::Announce => "announce",
            MessageKind::Register => "register",
            MessageKind::HeartbeatPing => "heartbeat-ping",
            MessageKind::HeartbeatPong => "heartbeat-pong",
            MessageKind::Telemetry => "telemetry",
            MessageKind::OccupancyReport => "occupancy-report",
            MessageKind::ConfigAck => "config-ack",
            MessageKind::ConfigError => "config-error",
            MessageKind::QueryAvailableDevices => "query-available-devices",
            MessageKind::QueryStatus => "query-status",
            MessageKind::AdminUnlock => "admin-unlock",
        }
    }

    /// Looks up a kind by its wire discriminant.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_wire() == value)
    }

    /// `true` for kinds only module firmware ever sends.
    ///
    /// Receiving one of these on a connection is what re-classifies it from
    /// observer to module.
    pub fn is_module_originated(self) -> bool {
        !self.is_observer_originated()
    }

    /// `true` for the snapshot/command requests that dashboards send.
    pub fn is_observer_originated(self) -> bool {
        matches!(
            self,
            MessageKind::QueryAvailableDevices | MessageKind::QueryStatus | MessageKind::AdminUnlock
        )
    }
}

// ── Inbound messages ──────────────────────────────────────────────────────────

/// All messages that a module or an observer can send to the hub.
///
/// # Serde representation
///
/// ```json
/// {"type":"announce","macAddress":"AA:BB:CC:DD:EE:FF","deviceInfo":"esp32","version":"1.2.0","capabilities":3}
/// {"type":"register","moduleId":"mod-1"}
/// {"type":"query-available-devices"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InboundMsg {
    /// An unconfigured device signals that it is reachable and waiting to be
    /// paired.
    Announce {
        /// Pre-registration identity of the device.
        mac_address: String,
        /// Free-form hardware description (board, locker count, ...).
        #[serde(default)]
        device_info: String,
        /// Firmware version string.
        #[serde(default, alias = "firmwareVersion")]
        version: String,
        /// Capability bitmask advertised by the firmware.
        #[serde(default)]
        capabilities: u32,
    },

    /// A configured device claims its module identity.
    Register { module_id: String },

    /// Module-initiated liveness ping.  The hub answers with a pong.
    HeartbeatPing { module_id: String },

    /// Module answer to a hub heartbeat probe.
    HeartbeatPong { module_id: String },

    /// Lock-state feed, the only confirmation that a command actually ran.
    Telemetry {
        module_id: String,
        locker_id: String,
        lock_state: LockState,
        /// Optional per-locker report counter used to reject reordered reports.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// Door sensor feed, independent of lock state.
    OccupancyReport {
        module_id: String,
        locker_id: String,
        occupied: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// The device accepted the configuration sent during pairing.
    ConfigAck {
        module_id: String,
        mac_address: String,
    },

    /// The device rejected the configuration sent during pairing.
    ConfigError {
        module_id: String,
        mac_address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Observer asks for the current list of unpaired devices.
    QueryAvailableDevices,

    /// Observer asks for cached locker state, optionally for one module.
    QueryStatus {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
    },

    /// Operator-initiated unlock from a dashboard.
    AdminUnlock {
        module_id: String,
        locker_id: String,
    },
}

impl InboundMsg {
    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMsg::Announce { .. } => MessageKind::Announce,
            InboundMsg::Register { .. } => MessageKind::Register,
            InboundMsg::HeartbeatPing { .. } => MessageKind::HeartbeatPing,
            InboundMsg::HeartbeatPong { .. } => MessageKind::HeartbeatPong,
            InboundMsg::Telemetry { .. } => MessageKind::Telemetry,
            InboundMsg::OccupancyReport { .. } => MessageKind::OccupancyReport,
            InboundMsg::ConfigAck { .. } => MessageKind::ConfigAck,
            InboundMsg::ConfigError { .. } => MessageKind::ConfigError,
            InboundMsg::QueryAvailableDevices => MessageKind::QueryAvailableDevices,
            InboundMsg::QueryStatus { .. } => MessageKind::QueryStatus,
            InboundMsg::AdminUnlock { .. } => MessageKind::AdminUnlock,
        }
    }
}

// ── Outbound messages ─────────────────────────────────────────────────────────

/// All messages that the hub sends to modules and observers.
///
/// # Serde representation
///
/// ```json
/// {"type":"registered-ack","moduleId":"mod-1","timestamp":1700000000000}
/// {"type":"unlock","lockerId":"L01","timestamp":1700000000000}
/// {"type":"status-changed","moduleId":"mod-1","lockerId":"L01","occupied":true,"timestamp":1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundMsg {
    /// Confirms that a `register` bound the connection to `module_id`.
    RegisteredAck { module_id: String, timestamp: u64 },

    /// Command frame: engage the bolt of `locker_id`.
    Lock { locker_id: String, timestamp: u64 },

    /// Command frame: release the bolt of `locker_id`.
    Unlock { locker_id: String, timestamp: u64 },

    /// One-time pairing payload.  The device compares `mac_address` with its
    /// own before applying the configuration.
    Configure {
        module_id: String,
        mac_address: String,
        locker_ids: Vec<String>,
    },

    /// Hub liveness probe; the module must answer with `heartbeat-pong`.
    HeartbeatPing { timestamp: u64 },

    /// Answer to a module-initiated `heartbeat-ping`.
    HeartbeatPong { timestamp: u64 },

    /// Broadcast: the set of unpaired devices changed.
    AvailableDevicesChanged { devices: Vec<AvailableDeviceView> },

    /// Reply to `query-available-devices`.
    AvailableDevices { devices: Vec<AvailableDeviceView> },

    /// Broadcast: a locker status was written to the cache.
    StatusChanged {
        module_id: String,
        locker_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        occupied: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lock_state: Option<LockState>,
        timestamp: u64,
    },

    /// Reply to `query-status`.
    StatusSnapshot { statuses: Vec<LockerStatus> },

    /// Reply to `admin-unlock`.  `delivered` is send-confirmed only.
    CommandResult {
        module_id: String,
        locker_id: String,
        action: LockAction,
        delivered: bool,
    },

    /// Generic error returned to the sender of a malformed frame.
    Error { message: String },
}

impl OutboundMsg {
    /// Returns the wire discriminant, for log lines that must not dump payloads.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMsg::RegisteredAck { .. } => "registered-ack",
            OutboundMsg::Lock { .. } => "lock",
            OutboundMsg::Unlock { .. } => "unlock",
            OutboundMsg::Configure { .. } => "configure",
            OutboundMsg::HeartbeatPing { .. } => "heartbeat-ping",
            OutboundMsg::HeartbeatPong { .. } => "heartbeat-pong",
            OutboundMsg::AvailableDevicesChanged { .. } => "available-devices-changed",
            OutboundMsg::AvailableDevices { .. } => "available-devices",
            OutboundMsg::StatusChanged { .. } => "status-changed",
            OutboundMsg::StatusSnapshot { .. } => "status-snapshot",
            OutboundMsg::CommandResult { .. } => "command-result",
            OutboundMsg::Error { .. } => "error",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
