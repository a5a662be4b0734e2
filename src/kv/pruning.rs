//! Expired-key sweeping for the fjall backend

use chrono::{DateTime, Utc};
use fjall::PartitionHandle;
use tracing::{debug, info, warn};

use super::Entry;
use super::error::Result;

/// Pruning statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    pub scanned: usize,
    pub expired: usize,
    pub unreadable: usize,
}

/// Remove expired and unreadable entries from a partition
///
/// Entries that cannot be decoded as an [`Entry`] are dropped as well; nothing
/// else writes to the partition, so they can only be leftovers of a crash.
pub fn purge_expired(partition: &PartitionHandle, now: DateTime<Utc>) -> Result<PurgeStats> {
    let mut stats = PurgeStats::default();
    let mut doomed = Vec::new();

    for item in partition.iter() {
        let (key, value) = item?;
        stats.scanned += 1;

        match serde_json::from_slice::<Entry>(&value) {
            Ok(entry) if entry.is_expired(now) => {
                stats.expired += 1;
                doomed.push(key);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Dropping unreadable entry");
                stats.unreadable += 1;
                doomed.push(key);
            }
        }
    }

    for key in doomed {
        partition.remove(key.clone())?;
        debug!(key = %String::from_utf8_lossy(&key), "Purged entry");
    }

    info!(
        scanned = stats.scanned,
        expired = stats.expired,
        unreadable = stats.unreadable,
        "Expired key purge complete"
    );
    Ok(stats)
}
