//! Time source for the hub.
//!
//! Heartbeat eviction and discovery staleness are pure arithmetic on
//! millisecond timestamps.  Reading the time through a trait lets tests drive
//! those decisions with a `MockClock` instead of sleeping.

use locker_core::protocol::current_timestamp_ms;

/// Source of the current time as Unix epoch milliseconds.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        current_timestamp_ms()
    }
}
