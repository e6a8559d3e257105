//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `listener` - TCP listener for inbound location updates (JSON lines)
//! - `persistence` - snapshot backup file writing and startup restore

pub mod listener;
pub mod persistence;

// Re-export commonly used types
pub use listener::{start_update_listener, UpdateListenerConfig};
pub use persistence::SnapshotStore;
