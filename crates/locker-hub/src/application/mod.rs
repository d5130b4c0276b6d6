//! Application layer for locker-hub.
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `registry`  | Identity ↔ connection bindings, available devices       |
//! | `hub`       | Core-state owner, inbound routing, status broadcasts    |
//! | `dispatch`  | Lock/unlock delivery for the rental layer               |
//! | `pairing`   | Provisioning of announced devices, ack ledger           |
//! | `liveness`  | Heartbeat eviction and discovery staleness passes       |
//! | `clock`     | Time source seam                                        |

pub mod clock;
pub mod dispatch;
pub mod hub;
pub mod liveness;
pub mod pairing;
pub mod registry;

pub use clock::{Clock, SystemClock};
pub use dispatch::DispatchError;
pub use hub::Hub;
pub use liveness::{DiscoveryReport, LivenessReport};
pub use pairing::{default_locker_ids, PairingError, PairingLedger, PendingPairing};
pub use registry::{
    AnnounceInfo, AnnounceOutcome, AvailableModule, ModuleConnection, Registration, Registry,
    RegistryError, Unbound,
};
