//! Brick placement for mason.
//!
//! This crate decides where the bricks of a logical volume live. The
//! pieces:
//!
//! - [`DeviceSource`] / [`ClusterView`] / [`CachedSource`]: how a pass
//!   sees and mutates the cluster without touching persistence.
//! - [`BrickPlacer`]: the placement strategy seam, with the
//!   [`StandardBrickPlacer`] for replica/disperse volumes and the
//!   [`ArbiterBrickPlacer`] for arbiter volumes.
//! - [`ZoneFilter`]: optional failure-zone spreading.
//! - [`BrickSizeGenerator`] and [`allocate_volume_bricks`]: the retry
//!   driver that halves brick sizes until a layout fits.
//!
//! Placement is randomized by design: two identical requests against
//! the same cluster may legitimately produce different layouts.

mod arbiter;
mod durability;
mod error;
mod filter;
mod opts;
mod placer;
mod set;
mod source;
mod standard;

pub use arbiter::{ArbiterBrickPlacer, RolePredicate};
pub use durability::{
    allocate_volume_bricks, placer_for_volume, BrickSizeGenerator, BRICK_MAX_SIZE, BRICK_MIN_SIZE,
};
pub use error::{PlacementError, SourceError};
pub use filter::{DeviceFilter, ZoneFilter};
pub use opts::{PlacementOpts, VolumePlacementOpts};
pub use placer::{Bookkeeping, BrickPlacer};
pub use set::{BrickAllocation, BrickSet, DeviceSet};
pub use source::{CachedSource, ClusterView, DeviceSource, MemoryCluster};
pub use standard::StandardBrickPlacer;

#[cfg(test)]
mod tests;
