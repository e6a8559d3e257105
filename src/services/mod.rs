//! Services - occupancy business logic and state management
//!
//! This module contains the core business logic services:
//! - `engine` - entry/exit state machine and invariant enforcement
//! - `registry` - concurrent zone name -> state map
//! - `zone_state` - per-zone membership set and crowd metrics
//! - `expiry` - TLV timers driving auto-exit
//! - `broadcaster` - snapshot fan-out to subscribers

pub mod broadcaster;
pub mod engine;
pub mod expiry;
pub mod registry;
pub mod zone_state;

// Re-export commonly used types
pub use broadcaster::{OccupancyBroadcast, SnapshotBroadcaster};
pub use engine::{EngineError, OccupancyEngine};
pub use expiry::TlvExpiryTracker;
pub use registry::ZoneRegistry;
pub use zone_state::ZoneState;
