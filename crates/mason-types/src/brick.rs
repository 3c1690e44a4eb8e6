//! Brick entries.

use serde::{Deserialize, Serialize};

use crate::{BrickId, DeviceId, NodeId, VolumeId};

/// Role of a brick within its redundancy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrickSubType {
    /// Not yet decided. A brick must be typed before it is created on a
    /// host; shipping an untyped brick to an executor is a bug.
    #[default]
    Unknown,
    /// An ordinary data brick.
    Normal,
    /// A reduced-size quorum brick holding metadata only.
    Arbiter,
}

/// A single physical allocation backing one slot of a volume's
/// redundancy set.
///
/// Constructed by [`DeviceEntry::new_brick`](crate::DeviceEntry::new_brick)
/// only after the device's free space has been deducted, so an existing
/// entry always has a non-zero size and a real footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickEntry {
    /// Unique identifier.
    pub id: BrickId,
    /// Usable brick size in KiB.
    pub size: u64,
    /// Thin-pool size backing the brick.
    pub tp_size: u64,
    /// Pool metadata size backing the brick.
    pub pool_metadata_size: u64,
    /// Device hosting the brick.
    pub device_id: DeviceId,
    /// Node owning that device.
    pub node_id: NodeId,
    /// Volume this brick belongs to.
    pub volume_id: VolumeId,
    /// Mount path of the brick on its host. May be empty on entries
    /// imported from legacy data.
    pub path: String,
    /// Requested owning gid for the brick filesystem.
    pub gid: i64,
    /// Role within the redundancy set.
    pub sub_type: BrickSubType,
}

impl BrickEntry {
    /// Total device space this brick occupies.
    pub fn total_space(&self) -> u64 {
        self.tp_size + self.pool_metadata_size
    }

    /// Mark the brick as an ordinary data brick.
    pub fn set_normal(&mut self) {
        self.sub_type = BrickSubType::Normal;
    }

    /// Mark the brick as an arbiter brick.
    pub fn set_arbiter(&mut self) {
        self.sub_type = BrickSubType::Arbiter;
    }
}

/// Canonical mount path for a brick on its host.
pub fn brick_path(device: &DeviceId, brick: &BrickId) -> String {
    format!("/var/lib/mason/mounts/vg_{device}/brick_{brick}/brick")
}
