//! Placement options.

use mason_types::{VolumeEntry, VolumeId, DEFAULT_AVERAGE_FILE_SIZE};

/// Everything a placer needs to know about the bricks it is asked to
/// place, decoupled from any particular volume representation.
pub trait PlacementOpts: Send + Sync {
    /// Brick size in KiB and the thin-pool snapshot factor.
    fn brick_sizes(&self) -> (u64, f64);

    /// Volume the bricks will belong to.
    fn brick_owner(&self) -> VolumeId;

    /// Owning gid for the brick filesystems.
    fn brick_gid(&self) -> i64;

    /// Bricks per durability set.
    fn set_size(&self) -> usize;

    /// Number of sets to place.
    fn set_count(&self) -> usize;

    /// Expected average file size in KiB, for arbiter sizing.
    fn average_file_size(&self) -> u64;
}

/// Placement options derived from a volume request.
#[derive(Debug, Clone)]
pub struct VolumePlacementOpts {
    volume_id: VolumeId,
    brick_size: u64,
    snapshot_factor: f64,
    gid: i64,
    set_size: usize,
    set_count: usize,
    average_file_size: u64,
}

impl VolumePlacementOpts {
    pub fn new(volume: &VolumeEntry, brick_size: u64, set_count: usize) -> Self {
        let average_file_size = if volume.average_file_size == 0 {
            DEFAULT_AVERAGE_FILE_SIZE
        } else {
            volume.average_file_size
        };
        Self {
            volume_id: volume.id,
            brick_size,
            snapshot_factor: volume.snapshot_factor,
            gid: volume.gid,
            set_size: volume.durability.set_size(),
            set_count,
            average_file_size,
        }
    }
}

impl PlacementOpts for VolumePlacementOpts {
    fn brick_sizes(&self) -> (u64, f64) {
        (self.brick_size, self.snapshot_factor)
    }

    fn brick_owner(&self) -> VolumeId {
        self.volume_id
    }

    fn brick_gid(&self) -> i64 {
        self.gid
    }

    fn set_size(&self) -> usize {
        self.set_size
    }

    fn set_count(&self) -> usize {
        self.set_count
    }

    fn average_file_size(&self) -> u64 {
        self.average_file_size
    }
}
