//! Domain models - core occupancy types and snapshot records
//!
//! This module contains the canonical data types used throughout the system:
//! - `UserId` - tracked individual on the campus
//! - `CrowdLevel` - derived LOW/MEDIUM/HIGH classification
//! - `LocationUpdate` / `ZoneAction` - inbound entry/exit requests
//! - `EnterOutcome` / `ExitOutcome` / `AutoExit` - engine operation results
//! - `RegistrySnapshot` - versioned backup/restore records

pub mod snapshot;
pub mod types;
