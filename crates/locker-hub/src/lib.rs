//! locker-hub library crate.
//!
//! The hub is the device session and command-delivery core of the locker
//! rental platform.  It keeps a live WebSocket to every locker module, lets
//! web dashboards watch locker state on the same endpoint, and delivers
//! lock/unlock commands on behalf of the rental layer.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Modules + dashboards (JSON over WebSocket)
//!         ↕
//! [locker-hub]
//!   ├── domain/           Connection handles, hub events, HubConfig
//!   ├── application/      Registry, Hub (routing, dispatch, pairing, liveness)
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop + per-connection tasks
//!         └── monitor/    Heartbeat and discovery timers
//! ```
//!
//! # Entry points for the rental layer
//!
//! The rental/admin CRUD layer holds an `Arc<Hub>` and calls
//! [`application::Hub::send_command`], [`application::Hub::query_status`],
//! [`application::Hub::list_online_module_ids`] and
//! [`application::Hub::pair`].  Every call is non-blocking but fallible.

/// Domain layer: connection handles, events and configuration.
pub mod domain;

/// Application layer: the registry and the hub that owns all session state.
pub mod application;

/// Infrastructure layer: WebSocket server and monitor timers.
pub mod infrastructure;
