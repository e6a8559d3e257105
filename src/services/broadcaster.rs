//! Snapshot broadcasting to live subscribers
//!
//! After any mutation the engine publishes the full ordered snapshot here.
//! Delivery is fire-and-forget: a send with no subscribers is fine, and a
//! slow subscriber lags and drops old snapshots rather than blocking the
//! mutating caller.

use crate::domain::types::ZoneSnapshot;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Payload pushed to every subscriber on each change
#[derive(Debug, Clone, Serialize)]
pub struct OccupancyBroadcast {
    /// Site identifier
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// One entry per registered zone, ordered by zone name
    pub zones: Vec<ZoneSnapshot>,
}

/// Fan-out handle for occupancy snapshots
pub struct SnapshotBroadcaster {
    tx: broadcast::Sender<OccupancyBroadcast>,
    site_id: String,
}

impl SnapshotBroadcaster {
    pub fn new(buffer: usize, site_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx, site_id: site_id.into() }
    }

    /// Register a new subscriber. Each subscriber sees snapshots published
    /// after this call; lagging subscribers skip ahead, they are never waited on.
    pub fn subscribe(&self) -> broadcast::Receiver<OccupancyBroadcast> {
        self.tx.subscribe()
    }

    /// Publish a snapshot to all current subscribers, best effort.
    pub fn publish(&self, ts: u64, zones: Vec<ZoneSnapshot>) {
        let payload = OccupancyBroadcast { site: self.site_id.clone(), ts, zones };
        // Err means no active subscribers; the snapshot is simply dropped
        let delivered = self.tx.send(payload).unwrap_or(0);
        trace!(subscribers = %delivered, "snapshot_published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
