//! In-memory locker status cache.
//!
//! Modules push two independent feeds: *telemetry* (the bolt is locked or
//! unlocked) and *occupancy reports* (the door sensor sees something inside).
//! The cache keeps the latest value of each per `(moduleId, lockerId)` so the
//! rental layer can answer "what does the hardware say right now?" without
//! asking the device.
//!
//! The cache is a best-effort mirror of physical state, not the rental system
//! of record.  Entries are never deleted; a locker whose module went offline
//! keeps its last values and an ageing `last_update`.
//!
//! # Ordering
//!
//! Reports can be reordered in transit.  A report may carry `seq`, a
//! per-locker counter maintained by the firmware.  A sequenced report whose
//! `seq` is not greater than the last applied one is rejected as
//! [`RecordOutcome::Stale`].  Reports without `seq` always apply.  Device
//! counters restart on reboot, so the hub calls
//! [`StatusCache::reset_sequences`] whenever a module registers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::messages::{LockState, OutboundMsg};

/// One reading carried by a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Occupancy(bool),
    Lock(LockState),
}

/// A status report on its way into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub module_id: String,
    pub locker_id: String,
    pub reading: Reading,
    /// Unix epoch milliseconds at which the hub received the report.
    pub timestamp: u64,
    pub seq: Option<u64>,
}

/// Last known state of one locker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockerStatus {
    pub module_id: String,
    pub locker_id: String,
    /// `None` until the first occupancy report for this locker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupied: Option<bool>,
    /// `None` until the first telemetry report for this locker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_state: Option<LockState>,
    /// Unix epoch milliseconds of the last applied report.
    pub last_update: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl LockerStatus {
    fn empty(module_id: &str, locker_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            locker_id: locker_id.to_string(),
            occupied: None,
            lock_state: None,
            last_update: 0,
            seq: None,
        }
    }

    /// Builds the `status-changed` broadcast carrying this entry.
    pub fn to_change_frame(&self) -> OutboundMsg {
        OutboundMsg::StatusChanged {
            module_id: self.module_id.clone(),
            locker_id: self.locker_id.clone(),
            occupied: self.occupied,
            lock_state: self.lock_state,
            timestamp: self.last_update,
        }
    }
}

/// Result of offering a report to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The report was written; carries the entry as it now stands.
    Applied(LockerStatus),
    /// The report's `seq` was not newer than `last_seq`; nothing changed.
    Stale { last_seq: u64 },
}

/// Table of [`LockerStatus`] keyed by `(moduleId, lockerId)`.
///
/// A `BTreeMap` keeps snapshots sorted by module then locker, which is the
/// order dashboards display them in.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: BTreeMap<(String, String), LockerStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a report to the cache, applying the sequence guard.
    pub fn record(&mut self, update: StatusUpdate) -> RecordOutcome {
        let key = (update.module_id, update.locker_id);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with_key(|(m, l)| LockerStatus::empty(m, l));

        if let (Some(incoming), Some(last)) = (update.seq, entry.seq) {
            if incoming <= last {
                return RecordOutcome::Stale { last_seq: last };
            }
        }

        match update.reading {
            Reading::Occupancy(occupied) => entry.occupied = Some(occupied),
            Reading::Lock(state) => entry.lock_state = Some(state),
        }
        entry.last_update = update.timestamp;
        if update.seq.is_some() {
            entry.seq = update.seq;
        }
        RecordOutcome::Applied(entry.clone())
    }

    /// Unconditionally overwrites the occupancy of one locker.
    ///
    /// This is the plain last-call-wins write used by collaborators that have
    /// no sequence information.
    pub fn record_status(
        &mut self,
        module_id: &str,
        locker_id: &str,
        occupied: bool,
        timestamp: u64,
    ) -> LockerStatus {
        let entry = self
            .entries
            .entry((module_id.to_string(), locker_id.to_string()))
            .or_insert_with(|| LockerStatus::empty(module_id, locker_id));
        entry.occupied = Some(occupied);
        entry.last_update = timestamp;
        entry.clone()
    }

    /// Returns one entry.
    pub fn get(&self, module_id: &str, locker_id: &str) -> Option<&LockerStatus> {
        self.entries
            .get(&(module_id.to_string(), locker_id.to_string()))
    }

    /// Returns a snapshot of all entries, or only those of `module_id`.
    pub fn query(&self, module_id: Option<&str>) -> Vec<LockerStatus> {
        self.entries
            .values()
            .filter(|s| module_id.map_or(true, |m| s.module_id == m))
            .cloned()
            .collect()
    }

    /// Forgets the last applied `seq` of every locker of `module_id`.
    ///
    /// Readings are kept; only the ordering guard restarts.
    pub fn reset_sequences(&mut self, module_id: &str) {
        self.entries
            .values_mut()
            .filter(|s| s.module_id == module_id)
            .for_each(|s| s.seq = None);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn occupancy(locker: &str, occupied: bool, ts: u64, seq: Option<u64>) -> StatusUpdate {
        StatusUpdate {
            module_id: "mod-1".to_string(),
            locker_id: locker.to_string(),
            reading: Reading::Occupancy(occupied),
            timestamp: ts,
            seq,
        }
    }

    #[test]
    fn test_cache_starts_empty() {
        let cache = StatusCache::new();
        assert!(cache.is_empty());
        assert!(cache.query(None).is_empty());
    }

    #[test]
    fn test_record_creates_entry() {
        // Arrange
        let mut cache = StatusCache::new();

        // Act
        let outcome = cache.record(occupancy("L01", true, 10, None));

        // Assert
        match outcome {
            RecordOutcome::Applied(status) => {
                assert_eq!(status.occupied, Some(true));
                assert_eq!(status.lock_state, None);
                assert_eq!(status.last_update, 10);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unsequenced_reports_are_last_write_wins() {
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 20, None));
        cache.record(occupancy("L01", false, 10, None));

        let status = cache.get("mod-1", "L01").unwrap();
        assert_eq!(status.occupied, Some(false));
        assert_eq!(status.last_update, 10);
    }

    #[test]
    fn test_reordered_sequenced_report_is_stale() {
        // Arrange: seq 5 arrives before seq 4
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 20, Some(5)));

        // Act
        let outcome = cache.record(occupancy("L01", false, 21, Some(4)));

        // Assert: fresher value kept
        assert_eq!(outcome, RecordOutcome::Stale { last_seq: 5 });
        assert_eq!(cache.get("mod-1", "L01").unwrap().occupied, Some(true));
    }

    #[test]
    fn test_duplicate_sequence_is_stale() {
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 20, Some(5)));
        let outcome = cache.record(occupancy("L01", true, 21, Some(5)));
        assert_eq!(outcome, RecordOutcome::Stale { last_seq: 5 });
    }

    #[test]
    fn test_unsequenced_report_keeps_previous_sequence() {
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 20, Some(5)));
        cache.record(occupancy("L01", false, 21, None));

        let status = cache.get("mod-1", "L01").unwrap();
        assert_eq!(status.occupied, Some(false));
        assert_eq!(status.seq, Some(5));
    }

    #[test]
    fn test_telemetry_and_occupancy_merge_into_one_entry() {
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 10, None));
        cache.record(StatusUpdate {
            module_id: "mod-1".to_string(),
            locker_id: "L01".to_string(),
            reading: Reading::Lock(LockState::Locked),
            timestamp: 11,
            seq: None,
        });

        let status = cache.get("mod-1", "L01").unwrap();
        assert_eq!(status.occupied, Some(true));
        assert_eq!(status.lock_state, Some(LockState::Locked));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reset_sequences_accepts_restarted_counter() {
        // Arrange: device reported up to seq 40, then rebooted
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 10, Some(40)));

        // Act
        cache.reset_sequences("mod-1");
        let outcome = cache.record(occupancy("L01", false, 11, Some(1)));

        // Assert
        assert!(matches!(outcome, RecordOutcome::Applied(_)));
        assert_eq!(cache.get("mod-1", "L01").unwrap().occupied, Some(false));
    }

    #[test]
    fn test_record_status_overwrites_unconditionally() {
        let mut cache = StatusCache::new();
        cache.record(occupancy("L01", true, 50, Some(9)));

        let status = cache.record_status("mod-1", "L01", false, 5);

        assert_eq!(status.occupied, Some(false));
        assert_eq!(status.last_update, 5);
    }

    #[test]
    fn test_query_filters_by_module_and_sorts() {
        let mut cache = StatusCache::new();
        cache.record_status("mod-2", "L01", true, 1);
        cache.record_status("mod-1", "L02", false, 1);
        cache.record_status("mod-1", "L01", true, 1);

        let only_mod1 = cache.query(Some("mod-1"));
        let all = cache.query(None);

        assert_eq!(
            only_mod1
                .iter()
                .map(|s| s.locker_id.as_str())
                .collect::<Vec<_>>(),
            vec!["L01", "L02"]
        );
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].module_id, "mod-2");
    }

    #[test]
    fn test_query_unknown_module_is_empty() {
        let mut cache = StatusCache::new();
        cache.record_status("mod-1", "L01", true, 1);
        assert!(cache.query(Some("nope")).is_empty());
    }

    #[test]
    fn test_to_change_frame_carries_entry() {
        let mut cache = StatusCache::new();
        let status = cache.record_status("mod-1", "L03", true, 77);

        assert_eq!(
            status.to_change_frame(),
            OutboundMsg::StatusChanged {
                module_id: "mod-1".to_string(),
                locker_id: "L03".to_string(),
                occupied: Some(true),
                lock_state: None,
                timestamp: 77,
            }
        );
    }
}
