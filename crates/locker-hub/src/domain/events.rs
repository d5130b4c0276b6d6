//! Events emitted by the hub to its collaborators.
//!
//! The rental layer subscribes to these to keep its own records in step with
//! what the devices do (for example, marking a module as paired once the
//! device acknowledges its configuration).  Delivery is best-effort: the hub
//! uses `try_send`, so a consumer that falls behind loses events rather than
//! stalling device traffic.

use locker_core::ConnectionRole;

use crate::domain::connection::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A connection was accepted and classified.
    ConnectionOpened {
        connection_id: ConnectionId,
        role: ConnectionRole,
    },
    /// A module bound its identity to a connection.
    ModuleRegistered {
        module_id: String,
        connection_id: ConnectionId,
    },
    /// A newer registration replaced the binding held by `connection_id`.
    ModuleSuperseded {
        module_id: String,
        connection_id: ConnectionId,
    },
    /// A module's connection closed.
    ModuleDisconnected { module_id: String },
    /// A module missed the heartbeat window and was force-closed.
    ModuleEvicted { module_id: String },
    /// An unconfigured device announced itself for the first time.
    DeviceDiscovered { mac_address: String },
    /// An unconfigured device's connection closed.
    DeviceLost { mac_address: String },
    /// An unconfigured device stopped announcing and aged out.
    DeviceExpired { mac_address: String },
    /// The configuration frame was handed to the device's connection.
    DevicePaired {
        mac_address: String,
        module_id: String,
    },
    /// The device acknowledged its configuration.
    PairingConfirmed {
        mac_address: String,
        module_id: String,
    },
    /// The device refused its configuration.
    PairingRejected {
        mac_address: String,
        module_id: String,
        reason: Option<String>,
    },
    /// No acknowledgment arrived within the pairing window.
    PairingUnconfirmed {
        mac_address: String,
        module_id: String,
    },
}
