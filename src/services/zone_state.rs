//! Per-zone membership set and derived crowd metrics
//!
//! A zone holds the set of users currently inside it plus a crowd level
//! recomputed after every membership change, never lazily. Membership
//! mutations are idempotent: duplicate adds and absent removes are no-ops,
//! so the count can never go negative or double-count a user.

use crate::domain::types::{CrowdLevel, UserId, ZoneSnapshot};
use std::collections::HashSet;

/// State for a single named zone
#[derive(Debug, Clone)]
pub struct ZoneState {
    name: String,
    capacity: u32,
    active: HashSet<UserId>,
    crowd_level: CrowdLevel,
}

impl ZoneState {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            active: HashSet::new(),
            crowd_level: CrowdLevel::Low,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Update the configured capacity (admin-driven); membership is preserved
    /// and the crowd level is recomputed against the new capacity.
    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
        self.recompute_crowd_level();
    }

    /// Add a user to the zone.
    ///
    /// Returns true if newly added, false if already present. Never
    /// produces duplicate membership.
    pub fn add_user(&mut self, user_id: UserId) -> bool {
        let added = self.active.insert(user_id);
        if added {
            self.recompute_crowd_level();
        }
        added
    }

    /// Remove a user from the zone.
    ///
    /// Returns true only if the user was present; removing an absent user
    /// is a no-op returning false.
    pub fn remove_user(&mut self, user_id: &UserId) -> bool {
        let removed = self.active.remove(user_id);
        if removed {
            self.recompute_crowd_level();
        }
        removed
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.active.contains(user_id)
    }

    pub fn current_count(&self) -> usize {
        self.active.len()
    }

    pub fn occupancy_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.active.len() as f64 / f64::from(self.capacity) * 100.0
    }

    pub fn crowd_level(&self) -> CrowdLevel {
        self.crowd_level
    }

    /// Iterate the current members (order unspecified)
    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.active.iter()
    }

    fn recompute_crowd_level(&mut self) {
        self.crowd_level = CrowdLevel::from_occupancy(self.active.len(), self.capacity);
    }

    /// Derived metrics view of this zone
    pub fn to_snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            name: self.name.clone(),
            capacity: self.capacity,
            current_count: self.active.len(),
            occupancy_pct: self.occupancy_percentage(),
            crowd_level: self.crowd_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn test_add_user_idempotent() {
        let mut zone = ZoneState::new("library", 10);

        assert!(zone.add_user(uid("u1")));
        assert!(!zone.add_user(uid("u1")));
        assert_eq!(zone.current_count(), 1);
    }

    #[test]
    fn test_remove_absent_user_is_noop() {
        let mut zone = ZoneState::new("library", 10);

        assert!(!zone.remove_user(&uid("ghost")));
        assert_eq!(zone.current_count(), 0);

        zone.add_user(uid("u1"));
        assert!(zone.remove_user(&uid("u1")));
        assert!(!zone.remove_user(&uid("u1")));
        assert_eq!(zone.current_count(), 0);
    }

    #[test]
    fn test_crowd_level_recomputed_on_every_change() {
        let mut zone = ZoneState::new("lab", 10);
        assert_eq!(zone.crowd_level(), CrowdLevel::Low);

        for i in 0..5 {
            zone.add_user(uid(&format!("u{i}")));
        }
        assert_eq!(zone.crowd_level(), CrowdLevel::Medium);

        for i in 5..8 {
            zone.add_user(uid(&format!("u{i}")));
        }
        assert_eq!(zone.crowd_level(), CrowdLevel::High);

        zone.remove_user(&uid("u7"));
        assert_eq!(zone.crowd_level(), CrowdLevel::Medium);
    }

    #[test]
    fn test_capacity_20_scenario() {
        let mut zone = ZoneState::new("cafeteria", 20);

        for i in 0..10 {
            zone.add_user(uid(&format!("u{i}")));
        }
        assert_eq!(zone.occupancy_percentage(), 50.0);
        assert_eq!(zone.crowd_level(), CrowdLevel::Medium);

        zone.remove_user(&uid("u0"));
        assert_eq!(zone.occupancy_percentage(), 45.0);
        assert_eq!(zone.crowd_level(), CrowdLevel::Low);
    }

    #[test]
    fn test_over_capacity_is_representable() {
        let mut zone = ZoneState::new("gym", 2);
        zone.add_user(uid("u1"));
        zone.add_user(uid("u2"));
        zone.add_user(uid("u3"));

        assert_eq!(zone.current_count(), 3);
        assert_eq!(zone.occupancy_percentage(), 150.0);
        assert_eq!(zone.crowd_level(), CrowdLevel::High);
    }

    #[test]
    fn test_set_capacity_preserves_membership() {
        let mut zone = ZoneState::new("gym", 10);
        for i in 0..5 {
            zone.add_user(uid(&format!("u{i}")));
        }
        assert_eq!(zone.crowd_level(), CrowdLevel::Medium);

        zone.set_capacity(20);
        assert_eq!(zone.current_count(), 5);
        assert_eq!(zone.crowd_level(), CrowdLevel::Low);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut zone = ZoneState::new("library", 4);
        zone.add_user(uid("u1"));
        zone.add_user(uid("u2"));

        let snap = zone.to_snapshot();
        assert_eq!(snap.name, "library");
        assert_eq!(snap.capacity, 4);
        assert_eq!(snap.current_count, 2);
        assert_eq!(snap.occupancy_pct, 50.0);
        assert_eq!(snap.crowd_level, CrowdLevel::Medium);
    }
}
