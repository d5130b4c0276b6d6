//! Domain layer for locker-hub.
//!
//! # What belongs in the domain layer?
//!
//! - The connection handle through which every outbound frame travels
//! - Events the hub reports to its collaborators
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Socket accept loops or WebSocket framing
//! - Registry bookkeeping and routing decisions

pub mod config;
pub mod connection;
pub mod events;

pub use config::{ConfigError, HubConfig, HubConfigFile};
pub use connection::{ConnectionHandle, ConnectionId, OutboundFrame, DEFAULT_OUTBOUND_QUEUE};
pub use events::HubEvent;
