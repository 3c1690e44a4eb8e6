use std::collections::BTreeSet;

use mason_types::{BrickEntry, DeviceId, NodeId};

/// A positional group of bricks forming one durability unit.
///
/// Slots are fixed at construction and may be filled out of order; a slot
/// that has not been placed yet reads as `None`. Assigning past the declared
/// size is a programming error and panics.
#[derive(Debug, Clone)]
pub struct BrickSet {
    set_size: usize,
    slots: Vec<Option<BrickEntry>>,
}

impl BrickSet {
    pub fn new(set_size: usize) -> Self {
        Self {
            set_size,
            slots: vec![None; set_size],
        }
    }

    pub fn set_size(&self) -> usize {
        self.set_size
    }

    /// True once every slot holds a brick.
    pub fn full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Place a brick at a specific position, replacing any previous occupant.
    pub fn insert(&mut self, index: usize, brick: BrickEntry) {
        assert!(
            index < self.set_size,
            "slot {index} out of range for set of size {}",
            self.set_size
        );
        self.slots[index] = Some(brick);
    }

    /// Place a brick in the first free slot.
    pub fn add(&mut self, brick: BrickEntry) {
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| panic!("add to full set of size {}", self.set_size));
        self.slots[free] = Some(brick);
    }

    pub fn take(&mut self, index: usize) -> Option<BrickEntry> {
        self.slots[index].take()
    }

    pub fn get(&self, index: usize) -> Option<&BrickEntry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Iterate the placed bricks, skipping empty slots.
    pub fn bricks(&self) -> impl Iterator<Item = &BrickEntry> {
        self.slots.iter().flatten()
    }

    /// Nodes hosting the placed bricks.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.bricks().map(|b| b.node_id).collect()
    }

    /// Nodes hosting placed bricks at every position except `skip`.
    pub fn nodes_except(&self, skip: usize) -> BTreeSet<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .filter_map(|(_, s)| s.as_ref().map(|b| b.node_id))
            .collect()
    }
}

/// Device ids paired position-for-position with a [`BrickSet`].
#[derive(Debug, Clone)]
pub struct DeviceSet {
    set_size: usize,
    slots: Vec<Option<DeviceId>>,
}

impl DeviceSet {
    pub fn new(set_size: usize) -> Self {
        Self {
            set_size,
            slots: vec![None; set_size],
        }
    }

    pub fn set_size(&self) -> usize {
        self.set_size
    }

    pub fn full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn insert(&mut self, index: usize, device: DeviceId) {
        assert!(
            index < self.set_size,
            "slot {index} out of range for set of size {}",
            self.set_size
        );
        self.slots[index] = Some(device);
    }

    pub fn get(&self, index: usize) -> Option<DeviceId> {
        self.slots.get(index).copied().flatten()
    }

    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.slots.iter().copied().flatten()
    }
}

/// The outcome of a placement pass: brick sets and the devices backing them.
#[derive(Debug, Clone, Default)]
pub struct BrickAllocation {
    pub brick_sets: Vec<BrickSet>,
    pub device_sets: Vec<DeviceSet>,
}

impl BrickAllocation {
    /// Total bricks placed across all sets.
    pub fn brick_count(&self) -> usize {
        self.brick_sets.iter().map(|s| s.bricks().count()).sum()
    }
}
