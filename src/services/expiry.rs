//! TLV expiry tracking for presence records
//!
//! Every successful entry gets a time-limited-validity record carrying its
//! entry time and auto-exit deadline. The periodic sweep asks "which
//! records have expired as of now" and removes them in the same locked
//! operation, so an expiry is delivered at most once even when sweeps
//! overlap with concurrent entry/exit calls.

use crate::domain::types::UserId;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// A live presence record for one (user, zone) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEntry {
    /// When the user entered or last re-entered (epoch ms)
    pub entry_ms: u64,
    /// Auto-exit deadline (epoch ms)
    pub expected_exit_ms: u64,
}

/// Tracks live entries and their auto-exit deadlines
///
/// Outer key is user, inner key is zone name. The engine enforces
/// one zone per user; the tracker itself only guarantees at most one
/// record per (user, zone) pair.
#[derive(Default)]
pub struct TlvExpiryTracker {
    entries: Mutex<HashMap<UserId, HashMap<String, ZoneEntry>>>,
}

impl TlvExpiryTracker {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Create or replace the record for (user, zone), resetting the timer.
    pub fn record_entry(&self, user_id: &UserId, zone: &str, entry_ms: u64, tlv_ms: u64) {
        let entry = ZoneEntry { entry_ms, expected_exit_ms: entry_ms + tlv_ms };
        self.entries
            .lock()
            .entry(user_id.clone())
            .or_default()
            .insert(zone.to_string(), entry);
    }

    /// Remove the record for (user, zone) if present; no-op otherwise.
    pub fn clear_entry(&self, user_id: &UserId, zone: &str) -> bool {
        let mut entries = self.entries.lock();
        let Some(zones) = entries.get_mut(user_id) else {
            return false;
        };
        let removed = zones.remove(zone).is_some();
        if zones.is_empty() {
            entries.remove(user_id);
        }
        removed
    }

    /// Current record for (user, zone), if any.
    pub fn get(&self, user_id: &UserId, zone: &str) -> Option<ZoneEntry> {
        self.entries.lock().get(user_id).and_then(|zones| zones.get(zone)).copied()
    }

    /// Seconds until auto-exit, clamped at zero. None if no live record.
    pub fn remaining_seconds(&self, user_id: &UserId, zone: &str, now_ms: u64) -> Option<u64> {
        self.get(user_id, zone)
            .map(|entry| entry.expected_exit_ms.saturating_sub(now_ms) / 1000)
    }

    /// Remove and return every record whose deadline has passed.
    ///
    /// Read-and-remove happens under one lock hold, so each expiry is
    /// reported exactly once; a second sweep at the same instant finds
    /// nothing.
    pub fn sweep_expired(&self, now_ms: u64) -> Vec<(UserId, String)> {
        let mut entries = self.entries.lock();
        let mut expired = Vec::new();

        for (user_id, zones) in entries.iter_mut() {
            zones.retain(|zone, entry| {
                if entry.expected_exit_ms < now_ms {
                    expired.push((user_id.clone(), zone.clone()));
                    false
                } else {
                    true
                }
            });
        }
        entries.retain(|_, zones| !zones.is_empty());

        if !expired.is_empty() {
            debug!(count = %expired.len(), "tlv_entries_expired");
        }
        expired
    }

    /// All live records as (user, zone, entry) rows, for snapshot export.
    pub fn export(&self) -> Vec<(UserId, String, ZoneEntry)> {
        self.entries
            .lock()
            .iter()
            .flat_map(|(user_id, zones)| {
                zones.iter().map(|(zone, entry)| (user_id.clone(), zone.clone(), *entry))
            })
            .collect()
    }

    /// Restore a record verbatim (used when loading a persisted snapshot).
    pub fn restore_entry(&self, user_id: &UserId, zone: &str, entry: ZoneEntry) {
        self.entries
            .lock()
            .entry(user_id.clone())
            .or_default()
            .insert(zone.to_string(), entry);
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TLV_MS: u64 = 300_000;

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn test_record_entry_sets_deadline() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 1000, TLV_MS);

        let entry = tracker.get(&uid("u1"), "library").unwrap();
        assert_eq!(entry.entry_ms, 1000);
        assert_eq!(entry.expected_exit_ms, 301_000);
    }

    #[test]
    fn test_reentry_replaces_and_resets_timer() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 1000, TLV_MS);
        tracker.record_entry(&uid("u1"), "library", 200_000, TLV_MS);

        assert_eq!(tracker.len(), 1);
        let entry = tracker.get(&uid("u1"), "library").unwrap();
        assert_eq!(entry.entry_ms, 200_000);
        assert_eq!(entry.expected_exit_ms, 500_000);
    }

    #[test]
    fn test_clear_entry() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 1000, TLV_MS);

        assert!(tracker.clear_entry(&uid("u1"), "library"));
        assert!(!tracker.clear_entry(&uid("u1"), "library"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_remaining_seconds_clamps_at_zero() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 1000, TLV_MS);

        assert_eq!(tracker.remaining_seconds(&uid("u1"), "library", 1000), Some(300));
        assert_eq!(tracker.remaining_seconds(&uid("u1"), "library", 151_000), Some(150));
        assert_eq!(tracker.remaining_seconds(&uid("u1"), "library", 999_999), Some(0));
        assert_eq!(tracker.remaining_seconds(&uid("u1"), "gym", 1000), None);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 0, TLV_MS);
        tracker.record_entry(&uid("u2"), "gym", 200_000, TLV_MS);

        let expired = tracker.sweep_expired(300_001);
        assert_eq!(expired, vec![(uid("u1"), "library".to_string())]);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&uid("u2"), "gym").is_some());
    }

    #[test]
    fn test_sweep_is_at_most_once() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 0, TLV_MS);

        let first = tracker.sweep_expired(400_000);
        let second = tracker.sweep_expired(400_000);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_sweep_boundary_is_strictly_less_than_now() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 0, TLV_MS);

        // Deadline is 300_000; not yet expired at exactly 300_000
        assert!(tracker.sweep_expired(300_000).is_empty());
        assert_eq!(tracker.sweep_expired(300_001).len(), 1);
    }

    #[test]
    fn test_export_and_restore_round_trip() {
        let tracker = TlvExpiryTracker::new();
        tracker.record_entry(&uid("u1"), "library", 1000, TLV_MS);
        tracker.record_entry(&uid("u2"), "gym", 2000, TLV_MS);

        let rows = tracker.export();
        assert_eq!(rows.len(), 2);

        let restored = TlvExpiryTracker::new();
        for (user_id, zone, entry) in rows {
            restored.restore_entry(&user_id, &zone, entry);
        }
        assert_eq!(restored.get(&uid("u1"), "library"), tracker.get(&uid("u1"), "library"));
        assert_eq!(restored.get(&uid("u2"), "gym"), tracker.get(&uid("u2"), "gym"));
    }
}
