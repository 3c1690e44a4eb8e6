//! Brick sizing and the allocation retry driver.
//!
//! A volume request names a total size; the cluster decides how many
//! sets that becomes. Allocation starts from one set of maximal bricks
//! and, whenever placement reports no space, doubles the set count —
//! halving the brick size — until a layout fits or bricks would fall
//! below the minimum.

use mason_types::{DurabilityConfig, VolumeEntry, GB, TB};
use tracing::{debug, info};

use crate::error::PlacementError;
use crate::filter::DeviceFilter;
use crate::opts::VolumePlacementOpts;
use crate::placer::BrickPlacer;
use crate::set::BrickAllocation;
use crate::source::{CachedSource, ClusterView};

/// Bricks never shrink below 1 GiB.
pub const BRICK_MIN_SIZE: u64 = GB;

/// Bricks never exceed 4 TiB; larger requests split into more sets
/// before the first attempt.
pub const BRICK_MAX_SIZE: u64 = 4 * TB;

/// Yields (set count, brick size) pairs, halving the brick size on
/// each step.
#[derive(Debug)]
pub struct BrickSizeGenerator {
    /// Total usable size requested, in KiB.
    size: u64,
    /// Data bricks contributing capacity per set: 1 for replicate and
    /// plain volumes, `data` for disperse.
    data_factor: u64,
    sets: u64,
}

impl BrickSizeGenerator {
    pub fn new(size: u64, durability: DurabilityConfig) -> Self {
        let data_factor = match durability {
            DurabilityConfig::Disperse { data, .. } => data as u64,
            _ => 1,
        };
        Self {
            size,
            data_factor,
            sets: 1,
        }
    }

    pub fn for_volume(volume: &VolumeEntry) -> Self {
        Self::new(volume.size, volume.durability)
    }

    /// The next layout to try.
    ///
    /// Fails with [`PlacementError::MinimumBrickSize`] once bricks
    /// would shrink below [`BRICK_MIN_SIZE`].
    pub fn next_layout(&mut self) -> Result<(usize, u64), PlacementError> {
        let mut brick_size;
        loop {
            brick_size = self.size / (self.sets * self.data_factor);
            if brick_size < BRICK_MIN_SIZE {
                return Err(PlacementError::MinimumBrickSize);
            }
            if brick_size <= BRICK_MAX_SIZE {
                break;
            }
            self.sets *= 2;
        }
        let sets = self.sets as usize;
        self.sets *= 2;
        debug!(sets, brick_size, "proposed brick layout");
        Ok((sets, brick_size))
    }
}

/// The placer matching a volume's configuration.
pub fn placer_for_volume(volume: &VolumeEntry) -> Box<dyn BrickPlacer> {
    if volume.arbiter {
        Box::new(crate::arbiter::ArbiterBrickPlacer::new())
    } else {
        Box::new(crate::standard::StandardBrickPlacer::new())
    }
}

/// Allocate the full brick layout for a volume.
///
/// Each sizing attempt runs against a fresh pass-scoped source, so a
/// failed attempt leaves no trace. On success the allocation is
/// returned together with the source holding the mutated device
/// entries, for the caller to persist in one step.
pub async fn allocate_volume_bricks<'v, V: ClusterView + ?Sized>(
    view: &'v V,
    volume: &VolumeEntry,
    placer: &dyn BrickPlacer,
    filter: Option<DeviceFilter<'_>>,
) -> Result<(BrickAllocation, CachedSource<'v, V>), PlacementError> {
    let mut generator = BrickSizeGenerator::for_volume(volume);
    loop {
        let (set_count, brick_size) = generator.next_layout()?;
        let opts = VolumePlacementOpts::new(volume, brick_size, set_count);
        let mut source = CachedSource::new(view, volume.cluster_id);

        match placer.place_all(&mut source, &opts, filter).await {
            Ok(allocation) => {
                info!(
                    volume = %volume.id,
                    sets = set_count,
                    brick_size,
                    "volume layout placed"
                );
                return Ok((allocation, source));
            }
            Err(PlacementError::NoSpace) => {
                debug!(
                    volume = %volume.id,
                    sets = set_count,
                    brick_size,
                    "layout does not fit; retrying with smaller bricks"
                );
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}
