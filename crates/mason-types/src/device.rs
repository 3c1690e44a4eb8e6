//! Device entries and the capacity/space model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::brick::{brick_path, BrickEntry, BrickSubType};
use crate::{
    ArbiterTag, BrickId, DeviceId, EntryError, EntryState, NodeId, VolumeId, ARBITER_TAG,
    DEFAULT_EXTENT_SIZE, GB,
};

/// Pool metadata is 0.5% of the thin pool, capped at 16 GiB.
const MAX_POOL_METADATA_SIZE: u64 = 16 * GB;
const POOL_METADATA_FRACTION: f64 = 0.005;

/// Capacity counters for a device, in KiB.
///
/// Invariant: `total == free + used` at all times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    /// Total capacity.
    pub total: u64,
    /// Capacity available for new bricks.
    pub free: u64,
    /// Capacity consumed by existing bricks.
    pub used: u64,
}

/// The on-disk footprint of one brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrickSpace {
    /// Thin-pool size: brick size times the snapshot factor, rounded up
    /// to the device's extent size.
    pub tp_size: u64,
    /// Pool metadata size, rounded up to the extent size.
    pub pool_metadata_size: u64,
}

impl BrickSpace {
    /// Total space the brick takes on the device.
    pub fn total(&self) -> u64 {
        self.tp_size + self.pool_metadata_size
    }
}

/// A storage device attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Unique identifier.
    pub id: DeviceId,
    /// The node this device belongs to.
    pub node_id: NodeId,
    /// Device path on the host (e.g. `/dev/sdb`).
    pub name: String,
    /// Lifecycle state.
    pub state: EntryState,
    /// Capacity counters.
    pub storage: Storage,
    /// Allocation granularity in KiB.
    pub extent_size: u64,
    /// Ids of the bricks hosted here, kept sorted.
    pub bricks: Vec<BrickId>,
    /// Operator-assigned key/value tags.
    pub tags: BTreeMap<String, String>,
}

impl DeviceEntry {
    /// Create a device entry with zeroed capacity.
    pub fn new(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::generate(),
            node_id,
            name: name.into(),
            state: EntryState::Online,
            storage: Storage::default(),
            extent_size: DEFAULT_EXTENT_SIZE,
            bricks: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Set total capacity on a freshly registered device (all free).
    pub fn set_capacity(&mut self, total: u64) {
        self.storage = Storage {
            total,
            free: total,
            used: 0,
        };
    }

    /// True if any brick lives on this device.
    pub fn has_bricks(&self) -> bool {
        !self.bricks.is_empty()
    }

    /// Record a brick id, keeping the list sorted.
    pub fn brick_add(&mut self, id: BrickId) {
        if let Err(pos) = self.bricks.binary_search(&id) {
            self.bricks.insert(pos, id);
        }
    }

    /// Remove a brick id. Removing an unknown id is a no-op.
    pub fn brick_delete(&mut self, id: &BrickId) {
        if let Ok(pos) = self.bricks.binary_search(id) {
            self.bricks.remove(pos);
        }
    }

    /// Request a lifecycle transition.
    ///
    /// `Online <-> Offline` are free; `Offline -> Failed` additionally
    /// requires the device to host no bricks. Use the device-removal
    /// workflow to drain a device that still has bricks.
    pub fn set_state(&mut self, to: EntryState) -> Result<(), EntryError> {
        match (self.state, to) {
            (from, to) if from == to => Ok(()),
            (EntryState::Online, EntryState::Offline)
            | (EntryState::Offline, EntryState::Online) => {
                self.state = to;
                Ok(())
            }
            (EntryState::Offline, EntryState::Failed) => {
                if self.has_bricks() {
                    return Err(EntryError::DeviceNotEmpty(self.id));
                }
                self.state = EntryState::Failed;
                Ok(())
            }
            (from, to) => Err(EntryError::InvalidTransition { from, to }),
        }
    }

    /// Mark the device failed without the emptiness check.
    ///
    /// Only the removal workflow's finalize step may use this, after it
    /// has migrated every brick away.
    pub fn force_fail(&mut self) {
        self.state = EntryState::Failed;
    }

    /// Arbiter capability of this device, falling back to its node's tag.
    pub fn arbiter_tag(&self, node_tags: &BTreeMap<String, String>) -> ArbiterTag {
        self.tags
            .get(ARBITER_TAG)
            .or_else(|| node_tags.get(ARBITER_TAG))
            .map(|v| ArbiterTag::parse(v))
            .unwrap_or_default()
    }

    // -- space model --

    /// Compute the footprint of a brick of `size` KiB with the given
    /// snapshot factor, aligned to this device's extent size.
    pub fn space_needed(&self, size: u64, snap_factor: f64) -> BrickSpace {
        let tp_size = self.align((size as f64 * snap_factor) as u64);
        let metadata = ((tp_size as f64 * POOL_METADATA_FRACTION) as u64)
            .min(MAX_POOL_METADATA_SIZE);
        BrickSpace {
            tp_size,
            pool_metadata_size: self.align(metadata),
        }
    }

    /// True if the device can host a brick with the given footprint.
    pub fn can_host(&self, space: &BrickSpace) -> bool {
        self.storage.free > space.total()
    }

    /// Deduct allocated space from the free counter.
    pub fn storage_allocate(&mut self, amount: u64) {
        self.storage.free -= amount;
        self.storage.used += amount;
    }

    /// Return freed space to the free counter.
    pub fn storage_free(&mut self, amount: u64) {
        self.storage.free += amount;
        self.storage.used -= amount;
    }

    /// Create a brick entry on this device, deducting its footprint.
    ///
    /// Returns `None` when the device lacks free space. The brick id is
    /// supplied by the caller so placement can control seeding; the
    /// brick is *not* added to `bricks` here — bookkeeping is a separate
    /// step owned by the placer (or deferred to the caller during a
    /// replacement pass).
    ///
    /// Panics if `size` is zero: a zero-size brick must never exist.
    pub fn new_brick(
        &mut self,
        id: BrickId,
        size: u64,
        snap_factor: f64,
        gid: i64,
        volume_id: VolumeId,
    ) -> Option<BrickEntry> {
        assert!(size > 0, "brick size must be non-zero");

        let space = self.space_needed(size, snap_factor);
        if !self.can_host(&space) {
            return None;
        }
        self.storage_allocate(space.total());
        debug!(
            device = %self.id,
            brick = %id,
            size,
            tp_size = space.tp_size,
            "allocated brick space"
        );

        Some(BrickEntry {
            id,
            size,
            tp_size: space.tp_size,
            pool_metadata_size: space.pool_metadata_size,
            device_id: self.id,
            node_id: self.node_id,
            volume_id,
            path: brick_path(&self.id, &id),
            gid,
            sub_type: BrickSubType::Unknown,
        })
    }

    /// Release the space held by a brick hosted on this device.
    pub fn free_brick(&mut self, brick: &BrickEntry) {
        self.storage_free(brick.tp_size + brick.pool_metadata_size);
        self.brick_delete(&brick.id);
    }

    fn align(&self, size: u64) -> u64 {
        let rem = size % self.extent_size;
        if rem == 0 {
            size
        } else {
            size + self.extent_size - rem
        }
    }
}
