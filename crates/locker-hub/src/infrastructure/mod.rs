//! Infrastructure layer for locker-hub.
//!
//! The infrastructure layer handles all I/O and time: accepting WebSocket
//! connections from modules and dashboards, and ticking the liveness timers.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener for the shared WebSocket endpoint
//! - Performing the WebSocket upgrade and reading the client type hint
//! - Running one reader and one writer task per connection
//! - Driving the heartbeat tick and discovery sweep on intervals
//! - Honouring the graceful shutdown flag
//!
//! # What does NOT belong here?
//!
//! - Routing and registry decisions (application layer)
//! - Message type definitions (`locker-core`)
//! - Configuration parsing (`main.rs` and `domain::config`)

pub mod monitor;
pub mod ws_server;

pub use monitor::spawn_monitors;
pub use ws_server::{run_server, serve};
