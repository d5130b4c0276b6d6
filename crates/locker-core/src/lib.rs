//! # locker-core
//!
//! Shared library for the locker hub containing the JSON wire protocol spoken
//! by locker modules and web observers, the connection classifier, and the
//! in-memory locker status cache.
//!
//! This crate has zero dependencies on sockets, async runtimes, or clocks that
//! it does not receive from the caller.  Everything here can be unit tested
//! without a network.
//!
//! # Architecture overview
//!
//! A locker *module* is a physical controller (typically an ESP32) that drives
//! a bank of locker doors.  It keeps a WebSocket open to the hub.  Web
//! dashboards (*observers*) connect to the very same endpoint to watch locker
//! state and to issue operator commands.  This crate defines:
//!
//! - **`protocol`** – The closed set of message kinds that travel over that
//!   shared endpoint, their payload shapes, and the JSON codec that turns text
//!   frames into typed messages (and back).
//!
//! - **`domain`** – Pure business rules: deciding whether a connection is a
//!   module or an observer, validating lock/unlock commands, and keeping the
//!   last reported occupancy / lock state of every locker.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `locker_core::InboundMsg` instead of `locker_core::protocol::messages::InboundMsg`.
pub use domain::classifier::{classify, ClientHint, ConnectionRole};
pub use domain::command::{validate_identifier, Command, CommandError, MAX_ID_LEN};
pub use domain::status::{LockerStatus, RecordOutcome, Reading, StatusCache, StatusUpdate};
pub use protocol::codec::{decode_inbound, encode_outbound, ProtocolError};
pub use protocol::messages::{
    AvailableDeviceView, InboundMsg, LockAction, LockState, MessageKind, OutboundMsg,
};
