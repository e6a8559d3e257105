//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Static zone definition (admin-provided)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZoneDef {
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyConfig {
    /// Time-limited validity of a presence record (seconds)
    #[serde(default = "default_tlv_secs")]
    pub tlv_secs: u64,
    /// Period of the auto-exit expiry sweep (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            tlv_secs: default_tlv_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_tlv_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,
    /// Snapshot file path (JSON)
    #[serde(default = "default_backup_file")]
    pub file: String,
    /// Period of the backup task (seconds)
    #[serde(default = "default_backup_interval_secs")]
    pub interval_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_backup_enabled(),
            file: default_backup_file(),
            interval_secs: default_backup_interval_secs(),
        }
    }
}

fn default_backup_enabled() -> bool {
    true
}

fn default_backup_file() -> String {
    "state/occupancy.json".to_string()
}

fn default_backup_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listener_port")]
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { enabled: default_listener_enabled(), port: default_listener_port() }
    }
}

fn default_listener_enabled() -> bool {
    true
}

fn default_listener_port() -> u16 {
    4680
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Subscriber channel capacity; lagging subscribers drop old snapshots
    #[serde(default = "default_broadcast_buffer")]
    pub buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { buffer: default_broadcast_buffer() }
    }
}

fn default_broadcast_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "main-campus")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "campus".to_string()
}

/// Raw TOML deserialization target
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub zone: Vec<ZoneDef>,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    tlv_secs: u64,
    sweep_interval_secs: u64,
    zones: Vec<ZoneDef>,
    backup_enabled: bool,
    backup_file: String,
    backup_interval_secs: u64,
    listener_enabled: bool,
    listener_port: u16,
    broadcast_buffer: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            tlv_secs: default_tlv_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            zones: Self::default_zones(),
            backup_enabled: default_backup_enabled(),
            backup_file: default_backup_file(),
            backup_interval_secs: default_backup_interval_secs(),
            listener_enabled: default_listener_enabled(),
            listener_port: default_listener_port(),
            broadcast_buffer: default_broadcast_buffer(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_zones() -> Vec<ZoneDef> {
        vec![
            ZoneDef { name: "library".to_string(), capacity: 120 },
            ZoneDef { name: "cafeteria".to_string(), capacity: 80 },
            ZoneDef { name: "gym".to_string(), capacity: 30 },
            ZoneDef { name: "auditorium".to_string(), capacity: 200 },
        ]
    }

    /// Determine config file path from environment, falling back to default
    pub fn resolve_config_path() -> String {
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            tlv_secs: toml_config.occupancy.tlv_secs,
            sweep_interval_secs: toml_config.occupancy.sweep_interval_secs,
            zones: toml_config.zone,
            backup_enabled: toml_config.backup.enabled,
            backup_file: toml_config.backup.file,
            backup_interval_secs: toml_config.backup.interval_secs,
            listener_enabled: toml_config.listener.enabled,
            listener_port: toml_config.listener.port,
            broadcast_buffer: toml_config.broadcast.buffer,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Check if a zone name is configured
    pub fn has_zone(&self, name: &str) -> bool {
        self.zones.iter().any(|z| z.name == name)
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn tlv_secs(&self) -> u64 {
        self.tlv_secs
    }

    pub fn tlv_ms(&self) -> u64 {
        self.tlv_secs * 1000
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    pub fn zones(&self) -> &[ZoneDef] {
        &self.zones
    }

    pub fn backup_enabled(&self) -> bool {
        self.backup_enabled
    }

    pub fn backup_file(&self) -> &str {
        &self.backup_file
    }

    pub fn backup_interval_secs(&self) -> u64 {
        self.backup_interval_secs
    }

    pub fn listener_enabled(&self) -> bool {
        self.listener_enabled
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    pub fn broadcast_buffer(&self) -> usize {
        self.broadcast_buffer
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the TLV duration
    pub fn with_tlv_secs(mut self, secs: u64) -> Self {
        self.tlv_secs = secs;
        self
    }

    /// Builder method to override the zone definitions
    pub fn with_zones(mut self, zones: Vec<ZoneDef>) -> Self {
        self.zones = zones;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "campus");
        assert_eq!(config.tlv_secs(), 300);
        assert_eq!(config.tlv_ms(), 300_000);
        assert_eq!(config.sweep_interval_secs(), 30);
        assert_eq!(config.backup_interval_secs(), 60);
        assert_eq!(config.listener_port(), 4680);
        assert_eq!(config.broadcast_buffer(), 64);
        assert_eq!(config.zones().len(), 4);
    }

    #[test]
    fn test_has_zone() {
        let config = Config::default();
        assert!(config.has_zone("library"));
        assert!(config.has_zone("gym"));
        assert!(!config.has_zone("pool"));
    }

    #[test]
    fn test_load_from_path_fallback() {
        let config = Config::load_from_path("does/not/exist.toml");
        assert_eq!(config.site_id(), "campus");
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_with_zones_builder() {
        let config = Config::default()
            .with_zones(vec![ZoneDef { name: "lab".to_string(), capacity: 10 }]);
        assert!(config.has_zone("lab"));
        assert!(!config.has_zone("library"));
    }
}
