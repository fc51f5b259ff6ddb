//! Snapshot comparison for polling monitors.

use std::collections::HashSet;

use crate::device::{DeviceKey, DeviceRecord};

/// Devices that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// In the current snapshot only, in order of appearance
    pub connected: Vec<DeviceRecord>,
    /// In the previous snapshot only, in order of appearance
    pub disconnected: Vec<DeviceRecord>,
}

impl SnapshotDiff {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }
}

/// Compute `current \ previous` and `previous \ current`.
///
/// Devices are matched with [`DeviceRecord::same_device`], so several units
/// of one model without distinct names collapse into one identity.
#[must_use]
pub fn diff_snapshots(previous: &[DeviceRecord], current: &[DeviceRecord]) -> SnapshotDiff {
    let previous_keys: HashSet<DeviceKey<'_>> = previous.iter().map(DeviceRecord::key).collect();
    let current_keys: HashSet<DeviceKey<'_>> = current.iter().map(DeviceRecord::key).collect();

    SnapshotDiff {
        connected: current
            .iter()
            .filter(|device| !previous_keys.contains(&device.key()))
            .cloned()
            .collect(),
        disconnected: previous
            .iter()
            .filter(|device| !current_keys.contains(&device.key()))
            .cloned()
            .collect(),
    }
}
