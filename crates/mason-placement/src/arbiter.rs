//! The arbiter placer.
//!
//! Arbiter volumes are replica-3 volumes where the third brick holds
//! metadata only: it provides quorum at a fraction of the capacity.
//! That asymmetry splits placement into two roles. Position 2 of every
//! set is the arbiter brick, sized by the expected file count rather
//! than the data size, and restricted to arbiter-capable devices;
//! positions 0 and 1 are data bricks restricted to data-capable
//! devices. Sets are filled in reverse order so the scarcest role
//! claims its device first.

use async_trait::async_trait;
use mason_ring::DeviceRing;
use mason_types::{ArbiterTag, BrickId, BrickSubType, DeviceAndNode, DeviceEntry, NodeEntry, MB};
use tracing::{debug, trace};

use crate::error::PlacementError;
use crate::filter::DeviceFilter;
use crate::opts::PlacementOpts;
use crate::placer::{Bookkeeping, BrickPlacer};
use crate::set::{BrickAllocation, BrickSet, DeviceSet};
use crate::source::DeviceSource;

/// Position of the arbiter brick within a set.
const ARBITER_INDEX: usize = 2;

/// An arbiter brick never shrinks below 16 MiB.
const MIN_ARBITER_SIZE: u64 = 16 * MB;

/// Space an arbiter brick reserves per expected file: one 4 KiB block.
const ARBITER_KB_PER_FILE: u64 = 4;

/// Capability predicate: may this device host bricks of a given role?
pub type RolePredicate = dyn Fn(&DeviceEntry, &NodeEntry) -> bool + Send + Sync;

/// Places replica-3 sets with a metadata-only arbiter at position 2.
pub struct ArbiterBrickPlacer {
    can_host_arbiter: Box<RolePredicate>,
    can_host_data: Box<RolePredicate>,
}

impl ArbiterBrickPlacer {
    /// Tag-driven capability rules: a device's `arbiter` tag (falling
    /// back to its node's) selects the roles it may serve. Untagged
    /// devices serve both.
    pub fn new() -> Self {
        Self {
            can_host_arbiter: Box::new(|device, node| {
                matches!(
                    device.arbiter_tag(&node.tags),
                    ArbiterTag::Supported | ArbiterTag::Required
                )
            }),
            can_host_data: Box::new(|device, node| {
                matches!(
                    device.arbiter_tag(&node.tags),
                    ArbiterTag::Supported | ArbiterTag::Disabled
                )
            }),
        }
    }

    /// Override the capability rules. Test hook and extension point.
    pub fn with_predicates(
        can_host_arbiter: Box<RolePredicate>,
        can_host_data: Box<RolePredicate>,
    ) -> Self {
        Self {
            can_host_arbiter,
            can_host_data,
        }
    }

    /// Size of the arbiter brick for a set of data bricks of
    /// `data_size` KiB: one block per expected file, floored.
    fn discounted_size(
        &self,
        data_size: u64,
        average_file_size: u64,
    ) -> Result<u64, PlacementError> {
        if average_file_size == 0 || average_file_size > data_size {
            return Err(PlacementError::ArbiterDiscount {
                brick_size: data_size,
                average_file_size,
            });
        }
        let files = data_size / average_file_size;
        Ok((files * ARBITER_KB_PER_FILE).max(MIN_ARBITER_SIZE))
    }

    /// Partition the candidates by role.
    async fn pools(
        &self,
        source: &mut dyn DeviceSource,
        candidates: &[DeviceAndNode],
    ) -> Result<DevicePools, PlacementError> {
        let mut pools = DevicePools::default();
        for dan in candidates {
            let node = source.node(dan.node).await?.clone();
            let device = source.device(dan.device).await?;
            if (self.can_host_arbiter)(device, &node) {
                pools.arbiter.push(*dan);
            }
            if (self.can_host_data)(device, &node) {
                pools.data.push(*dan);
            }
        }
        Ok(pools)
    }

    /// Walk one role-restricted ring until a device accepts the brick.
    #[allow(clippy::too_many_arguments)]
    async fn place_brick(
        &self,
        source: &mut dyn DeviceSource,
        pools: &DevicePools,
        brick_set: &mut BrickSet,
        device_set: &mut DeviceSet,
        position: usize,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
        bookkeeping: Bookkeeping,
    ) -> Result<(), PlacementError> {
        let (data_size, snap_factor) = opts.brick_sizes();
        let (size, sub_type) = if position == ARBITER_INDEX {
            let size = self.discounted_size(data_size, opts.average_file_size())?;
            (size, BrickSubType::Arbiter)
        } else {
            (data_size, BrickSubType::Normal)
        };

        let brick_id = BrickId::generate();
        let mut ring = DeviceRing::start(pools.role(position), brick_id.to_seed());
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
            brick.sub_type = sub_type;
            if bookkeeping == Bookkeeping::Record {
                device.brick_add(brick.id);
            }

            debug!(
                brick = %brick.id,
                device = %device_id,
                node = %device.node_id,
                position,
                role = ?sub_type,
                "placed brick"
            );
            ring.close();
            device_set.insert(position, device_id);
            brick_set.insert(position, brick);
            return Ok(());
        }

        Err(PlacementError::NoSpace)
    }
}

impl Default for ArbiterBrickPlacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Role-partitioned candidate lists. A device tagged for both roles
/// appears in both pools.
#[derive(Debug, Default)]
struct DevicePools {
    arbiter: Vec<DeviceAndNode>,
    data: Vec<DeviceAndNode>,
}

impl DevicePools {
    fn role(&self, position: usize) -> &[DeviceAndNode] {
        if position == ARBITER_INDEX {
            &self.arbiter
        } else {
            &self.data
        }
    }
}

#[async_trait]
impl BrickPlacer for ArbiterBrickPlacer {
    async fn place_all(
        &self,
        source: &mut dyn DeviceSource,
        opts: &dyn PlacementOpts,
        filter: Option<DeviceFilter<'_>>,
    ) -> Result<BrickAllocation, PlacementError> {
        let set_size = opts.set_size();
        assert_eq!(set_size, 3, "arbiter volumes are replica-3");

        let candidates = source.devices().await?;
        let pools = self.pools(source, &candidates).await?;
        let mut allocation = BrickAllocation::default();

        for _ in 0..opts.set_count() {
            let mut brick_set = BrickSet::new(set_size);
            let mut device_set = DeviceSet::new(set_size);

            // Arbiter-capable devices are usually the scarce resource,
            // so fill position 2 first.
            for position in (0..set_size).rev() {
                self.place_brick(
                    source,
                    &pools,
                    &mut brick_set,
                    &mut device_set,
                    position,
                    opts,
                    filter,
                    Bookkeeping::Record,
                )
                .await?;
            }

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
        let pools = self.pools(source, &candidates).await?;

        let mut brick_set = existing.clone();
        brick_set.take(index);
        let mut device_set = DeviceSet::new(set_size);
        for (position, brick) in (0..set_size).filter_map(|i| brick_set.get(i).map(|b| (i, b))) {
            device_set.insert(position, brick.device_id);
        }

        self.place_brick(
            source,
            &pools,
            &mut brick_set,
            &mut device_set,
            index,
            opts,
            filter,
            Bookkeeping::Defer,
        )
        .await?;

        Ok(BrickAllocation {
            brick_sets: vec![brick_set],
            device_sets: vec![device_set],
        })
    }
}
