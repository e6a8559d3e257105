//! Infrastructure - configuration and time
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `clock` - Injectable epoch-millisecond clock

pub mod clock;
pub mod config;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ZoneDef};
