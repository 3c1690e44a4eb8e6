//! Volume entries and durability configuration.

use serde::{Deserialize, Serialize};

use crate::{BrickId, ClusterId, VolumeId, KB};

/// Default snapshot space multiplier when snapshots are enabled.
pub const DEFAULT_SNAPSHOT_FACTOR: f64 = 1.5;

/// Default average file size used for arbiter sizing: 64 KiB.
pub const DEFAULT_AVERAGE_FILE_SIZE: u64 = 64 * KB;

/// Redundancy scheme for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DurabilityConfig {
    /// No redundancy: each set is a single brick.
    None,
    /// Replicate every brick `replica` ways.
    Replicate {
        /// Number of copies per set.
        replica: usize,
    },
    /// Erasure-code `data` bricks with `redundancy` parity bricks.
    Disperse {
        /// Data bricks per set.
        data: usize,
        /// Redundancy bricks per set.
        redundancy: usize,
    },
}

impl DurabilityConfig {
    /// The number of bricks in one redundancy set.
    pub fn set_size(&self) -> usize {
        match *self {
            DurabilityConfig::None => 1,
            DurabilityConfig::Replicate { replica } => replica,
            DurabilityConfig::Disperse { data, redundancy } => data + redundancy,
        }
    }

    /// How many bricks of a set must stay healthy for the set to keep
    /// serving while one member is swapped out.
    pub fn quorum(&self) -> usize {
        match *self {
            DurabilityConfig::None => 1,
            DurabilityConfig::Replicate { replica } => replica / 2 + 1,
            DurabilityConfig::Disperse { data, .. } => data,
        }
    }
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        DurabilityConfig::Replicate { replica: 3 }
    }
}

/// A logical volume tracked by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeEntry {
    /// Unique identifier.
    pub id: VolumeId,
    /// Human-facing volume name.
    pub name: String,
    /// Cluster the volume lives in.
    pub cluster_id: ClusterId,
    /// Requested volume size in KiB.
    pub size: u64,
    /// Snapshot space multiplier.
    pub snapshot_factor: f64,
    /// Redundancy scheme.
    pub durability: DurabilityConfig,
    /// Owning gid applied to brick filesystems.
    pub gid: i64,
    /// Expected average file size, used only for arbiter sizing.
    pub average_file_size: u64,
    /// Whether the volume uses an arbiter brick per set.
    pub arbiter: bool,
    /// Ids of the bricks backing this volume, kept sorted. The
    /// placement order within sets is owned by the remote volume
    /// layout, not by this list.
    pub bricks: Vec<BrickId>,
}

impl VolumeEntry {
    /// Create a volume entry with defaulted tuning knobs.
    pub fn new(
        cluster_id: ClusterId,
        name: impl Into<String>,
        size: u64,
        durability: DurabilityConfig,
    ) -> Self {
        let id = VolumeId::generate();
        let mut name = name.into();
        if name.is_empty() {
            name = format!("vol_{id}");
        }
        Self {
            id,
            name,
            cluster_id,
            size,
            snapshot_factor: DEFAULT_SNAPSHOT_FACTOR,
            durability,
            gid: 0,
            average_file_size: DEFAULT_AVERAGE_FILE_SIZE,
            arbiter: false,
            bricks: Vec::new(),
        }
    }

    /// Bricks per redundancy set for this volume.
    pub fn set_size(&self) -> usize {
        self.durability.set_size()
    }

    /// Record a brick id, keeping the list sorted.
    pub fn brick_add(&mut self, id: BrickId) {
        if let Err(pos) = self.bricks.binary_search(&id) {
            self.bricks.insert(pos, id);
        }
    }

    /// Remove a brick id. Unknown ids are a no-op.
    pub fn brick_delete(&mut self, id: &BrickId) {
        if let Ok(pos) = self.bricks.binary_search(id) {
            self.bricks.remove(pos);
        }
    }
}
