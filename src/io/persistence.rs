//! Snapshot persistence - periodic backup and startup restore
//!
//! The full registry snapshot is written as one JSON document. Writes go
//! to a temp file first and are renamed into place, so a crash mid-write
//! never leaves a truncated snapshot. A missing, unreadable, or
//! incompatible snapshot is not fatal: the engine starts empty.

use crate::domain::snapshot::{RegistrySnapshot, SNAPSHOT_VERSION};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Reads and writes the registry snapshot file
pub struct SnapshotStore {
    file_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        info!(file = %file_path.display(), "snapshot_store_initialized");
        Self { file_path }
    }

    /// Persist a snapshot. Returns true on success; failures are logged
    /// and never propagate to the caller's occupancy path.
    pub fn save(&self, snapshot: &RegistrySnapshot) -> bool {
        match self.write_atomic(snapshot) {
            Ok(()) => {
                info!(
                    zones = %snapshot.zones.len(),
                    users = %snapshot.occupant_count(),
                    file = %self.file_path.display(),
                    "backup_written"
                );
                true
            }
            Err(e) => {
                error!(file = %self.file_path.display(), error = %e, "backup_failed");
                false
            }
        }
    }

    fn write_atomic(&self, snapshot: &RegistrySnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.file_path)
            .with_context(|| format!("Failed to rename into {}", self.file_path.display()))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut path = self.file_path.clone().into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }

    /// Load the last snapshot, if a usable one exists.
    ///
    /// Missing file, unreadable content, and unknown format versions all
    /// yield None so startup proceeds from empty state.
    pub fn load(&self) -> Option<RegistrySnapshot> {
        if !Path::new(&self.file_path).exists() {
            info!(file = %self.file_path.display(), "no_snapshot_found");
            return None;
        }

        let content = match fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %self.file_path.display(), error = %e, "snapshot_read_failed");
                return None;
            }
        };

        let snapshot: RegistrySnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(file = %self.file_path.display(), error = %e, "snapshot_parse_failed");
                return None;
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                found = %snapshot.version,
                expected = %SNAPSHOT_VERSION,
                "snapshot_version_mismatch"
            );
            return None;
        }

        info!(
            zones = %snapshot.zones.len(),
            users = %snapshot.occupant_count(),
            taken_at_ms = %snapshot.taken_at_ms,
            "snapshot_loaded"
        );
        Some(snapshot)
    }
}
