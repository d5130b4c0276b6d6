//! Domain module: pure business rules with no I/O.
//!
//! - **`classifier`** – decides whether a connection is a module or an observer.
//! - **`command`** – the ephemeral lock/unlock command and its validation.
//! - **`status`** – last-known occupancy and lock state per locker.

pub mod classifier;
pub mod command;
pub mod status;
