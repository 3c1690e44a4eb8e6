//! The standard placer: replica and disperse sets.

use async_trait::async_trait;
use mason_ring::DeviceRing;
use mason_types::BrickId;
use tracing::{debug, trace};

use crate::error::PlacementError;
use crate::filter::DeviceFilter;
use crate::opts::PlacementOpts;
use crate::placer::{Bookkeeping, BrickPlacer};
use crate::set::{BrickAllocation, BrickSet, DeviceSet};
use crate::source::DeviceSource;

/// Places interchangeable bricks: every position of a set gets the same
/// size and the same eligibility rules. Used for replicate, disperse
/// and non-redundant volumes.
#[derive(Debug, Default)]
pub struct StandardBrickPlacer;

impl StandardBrickPlacer {
    pub fn new() -> Self {
        Self
    }

    /// Walk one ring until a device accepts the brick.
    ///
    /// A candidate is skipped when it shares a node with a brick already
    /// in the set, when the filter rejects it, or when it lacks space.
    #[allow(clippy::too_many_arguments)]
    async fn place_brick(
        &self,
        source: &mut dyn DeviceSource,
        ring: &mut DeviceRing,
        brick_set: &mut BrickSet,
        device_set: &mut DeviceSet,
        position: usize,
        brick_id: BrickId,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
        bookkeeping: Bookkeeping,
    ) -> Result<(), PlacementError> {
        let (size, snap_factor) = opts.brick_sizes();
        let used_nodes = brick_set.nodes_except(position);

        while let Some(device_id) = ring.next().await {
            let device = source.device(device_id).await?;
            if used_nodes.contains(&device.node_id) {
                trace!(device = %device_id, "skipped: node already in set");
                continue;
            }
            if let Some(filter) = filter {
                if !filter(brick_set, device) {
                    trace!(device = %device_id, "skipped: rejected by filter");
                    continue;
                }
            }
            let Some(mut brick) =
                device.new_brick(brick_id, size, snap_factor, opts.brick_gid(), opts.brick_owner())
            else {
                trace!(device = %device_id, "skipped: no space");
                continue;
            };
            brick.set_normal();
            if bookkeeping == Bookkeeping::Record {
                device.brick_add(brick.id);
            }

            debug!(
                brick = %brick.id,
                device = %device_id,
                node = %device.node_id,
                position,
                "placed brick"
            );
            device_set.insert(position, device_id);
            brick_set.insert(position, brick);
            return Ok(());
        }

        Err(PlacementError::NoSpace)
    }
}

#[async_trait]
impl BrickPlacer for StandardBrickPlacer {
    async fn place_all(
        &self,
        source: &mut dyn DeviceSource,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
    ) -> Result<BrickAllocation, PlacementError> {
        let candidates = source.devices().await?;
        let set_size = opts.set_size();
        let mut allocation = BrickAllocation::default();

        for _ in 0..opts.set_count() {
            // The seed id doubles as the id of the set's first brick.
            let seed = BrickId::generate();
            let mut ring = DeviceRing::start(&candidates, seed.to_seed());
            let mut brick_set = BrickSet::new(set_size);
            let mut device_set = DeviceSet::new(set_size);

            for position in 0..set_size {
                let brick_id = if position == 0 { seed } else { BrickId::generate() };
                self.place_brick(
                    source,
                    &mut ring,
                    &mut brick_set,
                    &mut device_set,
                    position,
                    brick_id,
                    opts,
                    filter,
                    Bookkeeping::Record,
                )
                .await?;
            }

            ring.close();
            allocation.brick_sets.push(brick_set);
            allocation.device_sets.push(device_set);
        }

        Ok(allocation)
    }

    async fn replace(
        &self,
        source: &mut dyn DeviceSource,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
        existing: &BrickSet,
        index: usize,
    ) -> Result<BrickAllocation, PlacementError> {
        let set_size = existing.set_size();
        if index >= set_size {
            return Err(PlacementError::OutOfBounds { index, set_size });
        }

        let candidates = source.devices().await?;
        let brick_id = BrickId::generate();
        let mut ring = DeviceRing::start(&candidates, brick_id.to_seed());

        let mut brick_set = existing.clone();
        brick_set.take(index);
        let mut device_set = DeviceSet::new(set_size);
        for (position, brick) in (0..set_size).filter_map(|i| brick_set.get(i).map(|b| (i, b))) {
            device_set.insert(position, brick.device_id);
        }

        self.place_brick(
            source,
            &mut ring,
            &mut brick_set,
            &mut device_set,
            index,
            brick_id,
            opts,
            filter,
            Bookkeeping::Defer,
        )
        .await?;
        ring.close();

        Ok(BrickAllocation {
            brick_sets: vec![brick_set],
            device_sets: vec![device_set],
        })
    }
}
