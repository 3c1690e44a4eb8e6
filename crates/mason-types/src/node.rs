//! Node entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClusterId, DeviceId, EntryError, EntryState, NodeId};

/// A management/storage host in a cluster.
///
/// A node's zone is the failure-domain key the zone filter uses to keep
/// redundant copies apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Unique identifier.
    pub id: NodeId,
    /// The cluster this node belongs to.
    pub cluster_id: ClusterId,
    /// Operator-defined failure zone.
    pub zone: u32,
    /// Hostname used for management traffic (remote execution).
    pub manage_hostname: String,
    /// Hostname used for storage traffic (brick paths).
    pub storage_hostname: String,
    /// Lifecycle state.
    pub state: EntryState,
    /// Devices attached to this node.
    pub devices: Vec<DeviceId>,
    /// Operator-assigned key/value tags.
    pub tags: BTreeMap<String, String>,
}

impl NodeEntry {
    /// Create a node entry in the given cluster and zone.
    pub fn new(
        cluster_id: ClusterId,
        zone: u32,
        manage_hostname: impl Into<String>,
        storage_hostname: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::generate(),
            cluster_id,
            zone,
            manage_hostname: manage_hostname.into(),
            storage_hostname: storage_hostname.into(),
            state: EntryState::Online,
            devices: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Attach a device id, keeping the list sorted.
    pub fn device_add(&mut self, id: DeviceId) {
        if let Err(pos) = self.devices.binary_search(&id) {
            self.devices.insert(pos, id);
        }
    }

    /// Detach a device id. Unknown ids are a no-op.
    pub fn device_delete(&mut self, id: &DeviceId) {
        if let Ok(pos) = self.devices.binary_search(id) {
            self.devices.remove(pos);
        }
    }

    /// Request a lifecycle transition. Nodes follow the same
    /// `Online <-> Offline -> Failed` ladder as devices but carry no
    /// emptiness requirement of their own: their devices gate that.
    pub fn set_state(&mut self, to: EntryState) -> Result<(), EntryError> {
        match (self.state, to) {
            (from, to) if from == to => Ok(()),
            (EntryState::Online, EntryState::Offline)
            | (EntryState::Offline, EntryState::Online)
            | (EntryState::Offline, EntryState::Failed) => {
                self.state = to;
                Ok(())
            }
            (from, to) => Err(EntryError::InvalidTransition { from, to }),
        }
    }
}
