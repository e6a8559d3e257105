//! Occupancy engine - the entry/exit state machine
//!
//! The engine exclusively owns the zone registry and the TLV tracker.
//! Each user is either OUTSIDE (no live entry anywhere) or INSIDE exactly
//! one zone; entering zone B while inside zone A implicitly exits A first.
//! Every mutating operation ends by recomputing the affected zone's crowd
//! level (inside ZoneState) and publishing the full snapshot to the
//! broadcaster, after all zone locks have been released.

use crate::domain::snapshot::{OccupantRecord, RegistrySnapshot, ZoneRecord};
use crate::domain::types::{AutoExit, EnterOutcome, ExitOutcome, UserId, ZoneSnapshot};
use crate::infra::clock::Clock;
use crate::infra::config::Config;
use crate::services::broadcaster::{OccupancyBroadcast, SnapshotBroadcaster};
use crate::services::expiry::{TlvExpiryTracker, ZoneEntry};
use crate::services::registry::ZoneRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Domain errors surfaced to callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown zone: {0}")]
    ZoneNotFound(String),
}

const PRESENCE_SHARDS: usize = 16;

/// Which zone each user is currently inside, if any.
///
/// Sharded by user hash so transitions for different users do not contend
/// on one lock; only same-user transitions serialize. Cross-zone traffic
/// therefore proceeds in parallel end to end.
struct PresenceMap {
    shards: [Mutex<HashMap<UserId, String>>; PRESENCE_SHARDS],
}

impl PresenceMap {
    fn new() -> Self {
        Self { shards: std::array::from_fn(|_| Mutex::new(HashMap::new())) }
    }

    fn shard(&self, user_id: &UserId) -> &Mutex<HashMap<UserId, String>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % PRESENCE_SHARDS]
    }

    fn get(&self, user_id: &UserId) -> Option<String> {
        self.shard(user_id).lock().get(user_id).cloned()
    }
}

/// Central occupancy state machine
pub struct OccupancyEngine {
    registry: ZoneRegistry,
    tlv: TlvExpiryTracker,
    presence: PresenceMap,
    broadcaster: SnapshotBroadcaster,
    clock: Arc<dyn Clock>,
    tlv_ms: u64,
}

impl OccupancyEngine {
    /// Create an engine with zones from config and an empty membership.
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: ZoneRegistry::from_defs(config.zones()),
            tlv: TlvExpiryTracker::new(),
            presence: PresenceMap::new(),
            broadcaster: SnapshotBroadcaster::new(config.broadcast_buffer(), config.site_id()),
            clock,
            tlv_ms: config.tlv_ms(),
        }
    }

    /// Subscribe to snapshot broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<OccupancyBroadcast> {
        self.broadcaster.subscribe()
    }

    /// Record a user entering a zone.
    ///
    /// Unknown zone fails with `ZoneNotFound` and has no side effect.
    /// Re-entering the current zone is idempotent and only resets the TLV
    /// timer. Entering while inside a different zone implicitly exits it
    /// first, reported via `auto_exited`.
    pub fn enter(&self, user_id: &UserId, zone: &str) -> Result<EnterOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        let target = self
            .registry
            .get(zone)
            .ok_or_else(|| EngineError::ZoneNotFound(zone.to_string()))?;

        let outcome = {
            // Per-user transitions are serialized by the user's presence
            // shard; zone locks are taken one at a time inside it, never
            // nested.
            let mut current = self.presence.shard(user_id).lock();

            match current.get(user_id).cloned() {
                Some(prev) if prev == zone => {
                    // Already inside: reset the timer, membership unchanged
                    target.lock().add_user(user_id.clone());
                    self.tlv.record_entry(user_id, zone, now_ms, self.tlv_ms);
                    info!(user = %user_id, zone = %zone, "zone_reentry_timer_reset");
                    EnterOutcome {
                        previous_zone: Some(prev),
                        auto_exited: false,
                        already_present: true,
                    }
                }
                Some(prev) => {
                    // Implicit exit from the previous zone before the switch
                    if let Some(prev_zone) = self.registry.get(&prev) {
                        prev_zone.lock().remove_user(user_id);
                    }
                    self.tlv.clear_entry(user_id, &prev);
                    info!(user = %user_id, zone = %prev, "auto_exit");

                    target.lock().add_user(user_id.clone());
                    self.tlv.record_entry(user_id, zone, now_ms, self.tlv_ms);
                    current.insert(user_id.clone(), zone.to_string());
                    info!(user = %user_id, zone = %zone, previous = %prev, "zone_entered");
                    EnterOutcome {
                        previous_zone: Some(prev),
                        auto_exited: true,
                        already_present: false,
                    }
                }
                None => {
                    target.lock().add_user(user_id.clone());
                    self.tlv.record_entry(user_id, zone, now_ms, self.tlv_ms);
                    current.insert(user_id.clone(), zone.to_string());
                    info!(user = %user_id, zone = %zone, "zone_entered");
                    EnterOutcome { previous_zone: None, auto_exited: false, already_present: false }
                }
            }
        };

        self.publish_snapshot(now_ms);
        Ok(outcome)
    }

    /// Record a user leaving a zone.
    ///
    /// Exiting a zone the user is not inside is a no-op reported as
    /// `NotPresent`, never an error. Unknown zone fails with `ZoneNotFound`.
    pub fn exit(&self, user_id: &UserId, zone: &str) -> Result<ExitOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        let target = self
            .registry
            .get(zone)
            .ok_or_else(|| EngineError::ZoneNotFound(zone.to_string()))?;

        let outcome = {
            let mut current = self.presence.shard(user_id).lock();
            if current.get(user_id).map(String::as_str) == Some(zone) {
                target.lock().remove_user(user_id);
                self.tlv.clear_entry(user_id, zone);
                current.remove(user_id);
                info!(user = %user_id, zone = %zone, "zone_exited");
                ExitOutcome::Exited
            } else {
                info!(user = %user_id, zone = %zone, "zone_exit_not_present");
                ExitOutcome::NotPresent
            }
        };

        if outcome == ExitOutcome::Exited {
            self.publish_snapshot(now_ms);
        }
        Ok(outcome)
    }

    /// Expire stale presence records as of the clock's current time.
    ///
    /// Invoked periodically by the sweep task. Each expired entry is
    /// removed from its zone as an auto-exit, distinct from an explicit
    /// exit, and the user's current-zone pointer is cleared. Running the
    /// sweep twice in a row never double-removes an entry.
    ///
    /// Eviction is confirmed under the user's presence shard: a user who
    /// re-entered after the tracker collected them holds a fresh TLV
    /// record and is left untouched, and an entry already removed by an
    /// explicit exit is not reported again.
    pub fn run_expiry_sweep(&self) -> Vec<AutoExit> {
        let now_ms = self.clock.now_ms();
        let expired = self.tlv.sweep_expired(now_ms);
        if expired.is_empty() {
            return Vec::new();
        }

        let mut auto_exits = Vec::with_capacity(expired.len());
        for (user_id, zone) in expired {
            let mut current = self.presence.shard(&user_id).lock();
            // record_entry happens under this same shard lock, so a live
            // record here means a re-entry landed after collection
            if self.tlv.get(&user_id, &zone).is_some() {
                debug!(user = %user_id, zone = %zone, "auto_exit_superseded_by_reentry");
                continue;
            }
            let removed = self
                .registry
                .get(&zone)
                .map(|handle| handle.lock().remove_user(&user_id))
                .unwrap_or(false);
            let cleared = if current.get(&user_id).map(String::as_str) == Some(zone.as_str()) {
                current.remove(&user_id);
                true
            } else {
                false
            };
            drop(current);

            if removed || cleared {
                info!(user = %user_id, zone = %zone, "auto_exit");
                auto_exits.push(AutoExit { user_id, zone });
            }
        }

        if !auto_exits.is_empty() {
            self.publish_snapshot(now_ms);
        }
        auto_exits
    }

    /// Create a zone or update its capacity; membership is preserved.
    pub fn upsert_zone(&self, name: &str, capacity: u32) {
        self.registry.upsert(name, capacity);
        self.publish_snapshot(self.clock.now_ms());
    }

    /// Consistent view of every registered zone, ordered by name.
    pub fn snapshot(&self) -> Vec<ZoneSnapshot> {
        self.registry.all().iter().map(|zone| zone.lock().to_snapshot()).collect()
    }

    /// Seconds until auto-exit for (user, zone); None if no live entry.
    pub fn remaining_seconds(&self, user_id: &UserId, zone: &str) -> Option<u64> {
        self.tlv.remaining_seconds(user_id, zone, self.clock.now_ms())
    }

    /// Zone the user is currently inside, if any.
    pub fn current_zone(&self, user_id: &UserId) -> Option<String> {
        self.presence.get(user_id)
    }

    /// Export full state (membership plus TLV timers) for backup.
    pub fn export(&self) -> RegistrySnapshot {
        let now_ms = self.clock.now_ms();
        let zones = self
            .registry
            .all()
            .iter()
            .map(|handle| {
                let zone = handle.lock();
                let occupants = zone
                    .users()
                    .map(|user_id| {
                        let entry = self.tlv.get(user_id, zone.name()).unwrap_or(ZoneEntry {
                            entry_ms: now_ms,
                            expected_exit_ms: now_ms + self.tlv_ms,
                        });
                        OccupantRecord {
                            user_id: user_id.clone(),
                            entry_ms: entry.entry_ms,
                            expected_exit_ms: entry.expected_exit_ms,
                        }
                    })
                    .collect();
                ZoneRecord {
                    name: zone.name().to_string(),
                    capacity: zone.capacity(),
                    occupants,
                }
            })
            .collect();
        RegistrySnapshot::new(now_ms, zones)
    }

    /// Rebuild membership and TLV timers from a persisted snapshot.
    ///
    /// Zones present only in the snapshot are registered; configured zones
    /// keep their configured capacity. Called before traffic is accepted.
    pub fn restore(&self, snapshot: &RegistrySnapshot) {
        let mut restored_users = 0usize;
        for record in &snapshot.zones {
            if !self.registry.contains(&record.name) {
                self.registry.upsert(&record.name, record.capacity);
            }
            let Some(handle) = self.registry.get(&record.name) else {
                continue;
            };

            for occupant in &record.occupants {
                let mut current = self.presence.shard(&occupant.user_id).lock();
                if current.contains_key(&occupant.user_id) {
                    warn!(
                        user = %occupant.user_id,
                        zone = %record.name,
                        "restore_duplicate_user_skipped"
                    );
                    continue;
                }
                handle.lock().add_user(occupant.user_id.clone());
                self.tlv.restore_entry(
                    &occupant.user_id,
                    &record.name,
                    ZoneEntry {
                        entry_ms: occupant.entry_ms,
                        expected_exit_ms: occupant.expected_exit_ms,
                    },
                );
                current.insert(occupant.user_id.clone(), record.name.clone());
                restored_users += 1;
            }
        }
        info!(
            zones = %snapshot.zones.len(),
            users = %restored_users,
            taken_at_ms = %snapshot.taken_at_ms,
            "state_restored"
        );
    }

    fn publish_snapshot(&self, now_ms: u64) {
        self.broadcaster.publish(now_ms, self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CrowdLevel;
    use crate::infra::clock::ManualClock;
    use crate::infra::config::ZoneDef;

    const TLV_SECS: u64 = 300;

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    fn test_engine() -> (OccupancyEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = Config::default().with_tlv_secs(TLV_SECS).with_zones(vec![
            ZoneDef { name: "library".to_string(), capacity: 20 },
            ZoneDef { name: "gym".to_string(), capacity: 10 },
        ]);
        (OccupancyEngine::new(&config, clock.clone()), clock)
    }

    fn zone_count(engine: &OccupancyEngine, zone: &str) -> usize {
        engine
            .snapshot()
            .into_iter()
            .find(|z| z.name == zone)
            .map(|z| z.current_count)
            .unwrap_or(0)
    }

    #[test]
    fn test_enter_unknown_zone_has_no_side_effect() {
        let (engine, _) = test_engine();

        let err = engine.enter(&uid("u1"), "pool").unwrap_err();
        assert_eq!(err, EngineError::ZoneNotFound("pool".to_string()));
        assert!(engine.current_zone(&uid("u1")).is_none());
        assert_eq!(zone_count(&engine, "library"), 0);
    }

    #[test]
    fn test_enter_and_exit() {
        let (engine, _) = test_engine();

        let outcome = engine.enter(&uid("u1"), "library").unwrap();
        assert_eq!(outcome.previous_zone, None);
        assert!(!outcome.auto_exited);
        assert!(!outcome.already_present);
        assert_eq!(engine.current_zone(&uid("u1")), Some("library".to_string()));
        assert_eq!(zone_count(&engine, "library"), 1);

        let outcome = engine.exit(&uid("u1"), "library").unwrap();
        assert_eq!(outcome, ExitOutcome::Exited);
        assert!(engine.current_zone(&uid("u1")).is_none());
        assert_eq!(zone_count(&engine, "library"), 0);
        assert!(engine.remaining_seconds(&uid("u1"), "library").is_none());
    }

    #[test]
    fn test_reentry_is_idempotent_and_resets_timer() {
        let (engine, clock) = test_engine();

        engine.enter(&uid("u1"), "library").unwrap();
        clock.advance(200_000); // 200s into the 300s TLV
        assert_eq!(engine.remaining_seconds(&uid("u1"), "library"), Some(100));

        let outcome = engine.enter(&uid("u1"), "library").unwrap();
        assert!(outcome.already_present);
        assert!(!outcome.auto_exited);
        assert_eq!(zone_count(&engine, "library"), 1);
        // Timer back near the full TLV
        assert_eq!(engine.remaining_seconds(&uid("u1"), "library"), Some(TLV_SECS));
    }

    #[test]
    fn test_zone_switch_auto_exits_previous() {
        let (engine, _) = test_engine();

        engine.enter(&uid("u1"), "library").unwrap();
        let outcome = engine.enter(&uid("u1"), "gym").unwrap();

        assert_eq!(outcome.previous_zone, Some("library".to_string()));
        assert!(outcome.auto_exited);
        assert!(!outcome.already_present);
        assert_eq!(zone_count(&engine, "library"), 0);
        assert_eq!(zone_count(&engine, "gym"), 1);
        assert_eq!(engine.current_zone(&uid("u1")), Some("gym".to_string()));
        assert!(engine.remaining_seconds(&uid("u1"), "library").is_none());
    }

    #[test]
    fn test_exit_when_never_entered_is_not_present() {
        let (engine, _) = test_engine();

        assert_eq!(engine.exit(&uid("u1"), "library").unwrap(), ExitOutcome::NotPresent);
        assert_eq!(zone_count(&engine, "library"), 0);

        // Inside a different zone: exiting another one is still a no-op
        engine.enter(&uid("u1"), "gym").unwrap();
        assert_eq!(engine.exit(&uid("u1"), "library").unwrap(), ExitOutcome::NotPresent);
        assert_eq!(zone_count(&engine, "gym"), 1);
    }

    #[test]
    fn test_expiry_sweep_removes_exactly_once() {
        let (engine, clock) = test_engine();

        engine.enter(&uid("u1"), "library").unwrap();
        engine.enter(&uid("u2"), "gym").unwrap();

        clock.advance(TLV_SECS * 1000 + 1);
        let auto_exits = engine.run_expiry_sweep();
        assert_eq!(auto_exits.len(), 2);
        assert_eq!(zone_count(&engine, "library"), 0);
        assert_eq!(zone_count(&engine, "gym"), 0);
        assert!(engine.current_zone(&uid("u1")).is_none());

        // Second sweep at the same instant finds nothing
        assert!(engine.run_expiry_sweep().is_empty());
    }

    #[test]
    fn test_sweep_spares_recent_reentry() {
        let (engine, clock) = test_engine();

        engine.enter(&uid("u1"), "library").unwrap();
        clock.advance(200_000);
        engine.enter(&uid("u1"), "library").unwrap(); // timer reset

        clock.advance(150_000); // 350s after first entry, 150s after reset
        assert!(engine.run_expiry_sweep().is_empty());
        assert_eq!(zone_count(&engine, "library"), 1);
    }

    #[test]
    fn test_count_never_negative_under_mixed_sequences() {
        let (engine, _) = test_engine();

        engine.exit(&uid("u1"), "library").unwrap();
        engine.enter(&uid("u1"), "library").unwrap();
        engine.exit(&uid("u1"), "library").unwrap();
        engine.exit(&uid("u1"), "library").unwrap();
        engine.enter(&uid("u1"), "library").unwrap();
        engine.enter(&uid("u1"), "library").unwrap();

        assert_eq!(zone_count(&engine, "library"), 1);
    }

    #[test]
    fn test_snapshot_ordered_by_zone_name() {
        let (engine, _) = test_engine();
        engine.upsert_zone("annex", 5);

        let names: Vec<String> = engine.snapshot().into_iter().map(|z| z.name).collect();
        assert_eq!(names, vec!["annex", "gym", "library"]);
    }

    #[test]
    fn test_upsert_zone_preserves_membership() {
        let (engine, _) = test_engine();

        for i in 0..5 {
            engine.enter(&uid(&format!("u{i}")), "gym").unwrap();
        }
        let before = engine.snapshot().into_iter().find(|z| z.name == "gym").unwrap();
        assert_eq!(before.crowd_level, CrowdLevel::Medium);

        engine.upsert_zone("gym", 40);
        let after = engine.snapshot().into_iter().find(|z| z.name == "gym").unwrap();
        assert_eq!(after.current_count, 5);
        assert_eq!(after.capacity, 40);
        assert_eq!(after.crowd_level, CrowdLevel::Low);
    }

    #[test]
    fn test_broadcast_published_after_mutation() {
        let (engine, _) = test_engine();
        let mut rx = engine.subscribe();

        engine.enter(&uid("u1"), "library").unwrap();

        let payload = rx.try_recv().unwrap();
        assert_eq!(payload.zones.iter().find(|z| z.name == "library").unwrap().current_count, 1);
    }

    #[test]
    fn test_export_restore_round_trip() {
        let (engine, clock) = test_engine();

        engine.enter(&uid("u1"), "library").unwrap();
        clock.advance(5_000);
        engine.enter(&uid("u2"), "library").unwrap();
        engine.enter(&uid("u3"), "gym").unwrap();

        let exported = engine.export();
        assert_eq!(exported.occupant_count(), 3);

        let (restored, restored_clock) = test_engine();
        restored_clock.set(clock.now_ms());
        restored.restore(&exported);

        assert_eq!(restored.snapshot(), engine.snapshot());
        assert_eq!(restored.current_zone(&uid("u1")), Some("library".to_string()));
        assert_eq!(
            restored.remaining_seconds(&uid("u1"), "library"),
            engine.remaining_seconds(&uid("u1"), "library")
        );

        // Timers survive: advancing past the restored deadline expires u1 first
        restored_clock.advance(TLV_SECS * 1000 - 4_000);
        let auto_exits = restored.run_expiry_sweep();
        assert_eq!(auto_exits.len(), 1);
        assert_eq!(auto_exits[0].user_id, uid("u1"));
    }

    #[test]
    fn test_restore_registers_snapshot_only_zones() {
        let (engine, _) = test_engine();
        let snapshot = RegistrySnapshot::new(
            500,
            vec![ZoneRecord {
                name: "pool".to_string(),
                capacity: 15,
                occupants: vec![OccupantRecord {
                    user_id: uid("u9"),
                    entry_ms: 400,
                    expected_exit_ms: 300_400,
                }],
            }],
        );

        engine.restore(&snapshot);

        assert_eq!(zone_count(&engine, "pool"), 1);
        assert_eq!(engine.current_zone(&uid("u9")), Some("pool".to_string()));
    }
}
