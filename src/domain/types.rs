//! Shared types for the occupancy engine

use serde::{Deserialize, Serialize};

/// Newtype wrapper for user identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived crowd classification for a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    /// Classify occupancy: LOW below 50%, MEDIUM in [50%, 80%), HIGH at >= 80%.
    ///
    /// Integer arithmetic so the 50% and 80% boundaries are exact.
    /// Over-capacity counts classify as HIGH.
    pub fn from_occupancy(count: usize, capacity: u32) -> Self {
        let count = count as u64;
        let capacity = u64::from(capacity.max(1));
        if count * 10 >= capacity * 8 {
            CrowdLevel::High
        } else if count * 2 >= capacity {
            CrowdLevel::Medium
        } else {
            CrowdLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "low",
            CrowdLevel::Medium => "medium",
            CrowdLevel::High => "high",
        }
    }
}

/// Requested action in an inbound location update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneAction {
    Enter,
    Exit,
}

impl std::str::FromStr for ZoneAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTER" => Ok(ZoneAction::Enter),
            "EXIT" => Ok(ZoneAction::Exit),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Inbound location update from a client collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub user_id: UserId,
    pub zone: String,
    pub action: ZoneAction,
}

/// Result of an `enter` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterOutcome {
    /// Zone the user was in before this call, if any
    pub previous_zone: Option<String>,
    /// True when the previous zone differs and was implicitly exited
    pub auto_exited: bool,
    /// True when the user was already inside the target zone (timer reset only)
    pub already_present: bool,
}

/// Result of an `exit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The user was inside the zone and has been removed
    Exited,
    /// The user was not inside the zone; no state changed
    NotPresent,
}

impl ExitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitOutcome::Exited => "exited",
            ExitOutcome::NotPresent => "not_present",
        }
    }
}

/// A single expiry-driven removal produced by the sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoExit {
    pub user_id: UserId,
    pub zone: String,
}

/// Point-in-time view of one zone's derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub name: String,
    pub capacity: u32,
    pub current_count: usize,
    pub occupancy_pct: f64,
    pub crowd_level: CrowdLevel,
}
