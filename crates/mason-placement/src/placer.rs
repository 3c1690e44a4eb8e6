//! The brick placer interface.

use async_trait::async_trait;

use crate::error::PlacementError;
use crate::filter::DeviceFilter;
use crate::opts::PlacementOpts;
use crate::set::{BrickAllocation, BrickSet};
use crate::source::DeviceSource;

/// Whether a placement immediately records the brick on its device.
///
/// Placing a whole volume records as it goes; a replacement pass defers
/// so the caller can commit the swap (and only the swap) after the
/// remote side has accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bookkeeping {
    /// Add the brick to the device's brick list now.
    Record,
    /// Leave the device's brick list untouched; space is still
    /// deducted.
    Defer,
}

/// A strategy for laying bricks out across a cluster's devices.
#[async_trait]
pub trait BrickPlacer: Send + Sync {
    /// Place `opts.set_count()` full sets of bricks.
    ///
    /// On success every set is full; on [`PlacementError::NoSpace`]
    /// nothing is handed back, and the caller discards the pass-local
    /// source state.
    async fn place_all(
        &self,
        source: &mut dyn DeviceSource,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
    ) -> Result<BrickAllocation, PlacementError>;

    /// Place a substitute for position `index` of an existing set.
    ///
    /// Returns an allocation holding exactly one set, identical to
    /// `existing` except at `index`, where a freshly placed brick
    /// (with a fresh id) sits. Bookkeeping for the new brick is
    /// deferred to the caller.
    async fn replace(
        &self,
        source: &mut dyn DeviceSource,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
        existing: &BrickSet,
        index: usize,
    ) -> Result<BrickAllocation, PlacementError>;
}
