//! Device sources: how a placement pass sees the cluster.
//!
//! Placers never touch persistence directly. They work against a
//! [`DeviceSource`], which hands out the eligible candidate list and
//! mutable in-memory entries. [`CachedSource`] is the production shape:
//! a pass-scoped cache over a read-only [`ClusterView`], loading each
//! entry at most once and accumulating mutations for the caller to
//! persist (or discard) when the pass ends.

use std::collections::HashMap;

use async_trait::async_trait;
use mason_types::{
    BrickEntry, BrickId, ClusterId, DeviceAndNode, DeviceEntry, DeviceId, EntryState, NodeEntry,
    NodeId, VolumeEntry, VolumeId,
};
use tracing::debug;

use crate::error::SourceError;

/// Read-only topology access backing a [`CachedSource`].
///
/// `load_*` return owned copies; the source caches and mutates those
/// copies without writing anything back. `node_up` overlays liveness
/// from a health monitor on top of the administrative state.
#[async_trait]
pub trait ClusterView: Send + Sync {
    async fn node_ids(&self, cluster: ClusterId) -> Result<Vec<NodeId>, SourceError>;
    async fn load_node(&self, id: NodeId) -> Result<NodeEntry, SourceError>;
    async fn load_device(&self, id: DeviceId) -> Result<DeviceEntry, SourceError>;

    /// Liveness as last observed by the health monitor. Nodes with no
    /// recorded observation count as up.
    fn node_up(&self, _id: NodeId) -> bool {
        true
    }
}

/// Mutable topology access for one placement or removal pass.
#[async_trait]
pub trait DeviceSource: Send {
    /// The eligible placement candidates: devices that are online, on an
    /// online and healthy node.
    ///
    /// Returns [`SourceError::EmptyCluster`] when the cluster has no
    /// nodes at all, and [`SourceError::NoStorage`] when nodes exist but
    /// none of them contributes a usable device.
    async fn devices(&mut self) -> Result<Vec<DeviceAndNode>, SourceError>;

    /// The pass-local entry for a device.
    async fn device(&mut self, id: DeviceId) -> Result<&mut DeviceEntry, SourceError>;

    /// The pass-local entry for a node.
    async fn node(&mut self, id: NodeId) -> Result<&mut NodeEntry, SourceError>;
}

/// A pass-scoped cache over a [`ClusterView`].
///
/// Each entry is loaded at most once and then served from the cache, so
/// every lookup within the pass observes the same copy — including any
/// mutations the pass has made to it. After a successful pass the caller
/// drains the cache with [`CachedSource::into_entries`] and persists the
/// copies; on failure it simply drops the source.
pub struct CachedSource<'v, V: ?Sized> {
    view: &'v V,
    cluster: ClusterId,
    devices: HashMap<DeviceId, DeviceEntry>,
    nodes: HashMap<NodeId, NodeEntry>,
}

impl<'v, V: ClusterView + ?Sized> CachedSource<'v, V> {
    pub fn new(view: &'v V, cluster: ClusterId) -> Self {
        Self {
            view,
            cluster,
            devices: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    /// A cached entry, if the pass has touched it.
    pub fn cached_device(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.get(&id)
    }

    /// Drain the cache into the entries the pass has loaded (and
    /// possibly mutated), for the caller to persist.
    pub fn into_entries(self) -> (Vec<DeviceEntry>, Vec<NodeEntry>) {
        (
            self.devices.into_values().collect(),
            self.nodes.into_values().collect(),
        )
    }
}

#[async_trait]
impl<V: ClusterView + ?Sized> DeviceSource for CachedSource<'_, V> {
    async fn devices(&mut self) -> Result<Vec<DeviceAndNode>, SourceError> {
        let node_ids = self.view.node_ids(self.cluster).await?;
        if node_ids.is_empty() {
            return Err(SourceError::EmptyCluster);
        }

        let mut out = Vec::new();
        for node_id in node_ids {
            if !self.view.node_up(node_id) {
                debug!(node = %node_id, "skipping unhealthy node");
                continue;
            }
            let node = self.node(node_id).await?;
            if node.state != EntryState::Online {
                continue;
            }
            let pairs: Vec<(DeviceId, u32)> =
                node.devices.iter().map(|d| (*d, node.zone)).collect();
            for (device_id, zone) in pairs {
                let device = self.device(device_id).await?;
                if device.state != EntryState::Online {
                    continue;
                }
                out.push(DeviceAndNode {
                    device: device_id,
                    node: node_id,
                    zone,
                });
            }
        }

        if out.is_empty() {
            return Err(SourceError::NoStorage);
        }
        Ok(out)
    }

    async fn device(&mut self, id: DeviceId) -> Result<&mut DeviceEntry, SourceError> {
        if !self.devices.contains_key(&id) {
            let entry = self.view.load_device(id).await?;
            self.devices.insert(id, entry);
        }
        Ok(self.devices.get_mut(&id).expect("entry just cached"))
    }

    async fn node(&mut self, id: NodeId) -> Result<&mut NodeEntry, SourceError> {
        if !self.nodes.contains_key(&id) {
            let entry = self.view.load_node(id).await?;
            self.nodes.insert(id, entry);
        }
        Ok(self.nodes.get_mut(&id).expect("entry just cached"))
    }
}

// ---------------------------------------------------------------------------
// In-memory cluster catalog
// ---------------------------------------------------------------------------

/// An in-memory cluster catalog.
///
/// Serves as the authoritative store for the daemon's dry-run commands
/// and for tests. Implements [`ClusterView`] for placement passes and
/// exposes plain accessors for persisting mutated copies back.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    clusters: HashMap<ClusterId, Vec<NodeId>>,
    nodes: HashMap<NodeId, NodeEntry>,
    devices: HashMap<DeviceId, DeviceEntry>,
    volumes: HashMap<VolumeId, VolumeEntry>,
    bricks: HashMap<BrickId, BrickEntry>,
    node_health: HashMap<NodeId, bool>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster id. Idempotent.
    pub fn add_cluster(&mut self, id: ClusterId) {
        self.clusters.entry(id).or_default();
    }

    /// Register a node under its cluster.
    pub fn add_node(&mut self, node: NodeEntry) {
        self.clusters
            .entry(node.cluster_id)
            .or_default()
            .push(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Register a device and link it to its node.
    pub fn add_device(&mut self, device: DeviceEntry) {
        if let Some(node) = self.nodes.get_mut(&device.node_id) {
            node.device_add(device.id);
        }
        self.devices.insert(device.id, device);
    }

    pub fn add_volume(&mut self, volume: VolumeEntry) {
        self.volumes.insert(volume.id, volume);
    }

    pub fn add_brick(&mut self, brick: BrickEntry) {
        self.bricks.insert(brick.id, brick);
    }

    /// Override the health monitor's view of a node.
    pub fn set_node_health(&mut self, id: NodeId, up: bool) {
        self.node_health.insert(id, up);
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(&id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.get(&id)
    }

    pub fn volume(&self, id: VolumeId) -> Option<&VolumeEntry> {
        self.volumes.get(&id)
    }

    pub fn brick(&self, id: BrickId) -> Option<&BrickEntry> {
        self.bricks.get(&id)
    }

    pub fn volume_mut(&mut self, id: VolumeId) -> Option<&mut VolumeEntry> {
        self.volumes.get_mut(&id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut DeviceEntry> {
        self.devices.get_mut(&id)
    }

    /// Persist a mutated device copy.
    pub fn put_device(&mut self, device: DeviceEntry) {
        self.devices.insert(device.id, device);
    }

    /// Persist a mutated node copy.
    pub fn put_node(&mut self, node: NodeEntry) {
        self.nodes.insert(node.id, node);
    }

    pub fn put_volume(&mut self, volume: VolumeEntry) {
        self.volumes.insert(volume.id, volume);
    }

    pub fn put_brick(&mut self, brick: BrickEntry) {
        self.bricks.insert(brick.id, brick);
    }

    pub fn remove_brick(&mut self, id: &BrickId) -> Option<BrickEntry> {
        self.bricks.remove(id)
    }
}

#[async_trait]
impl ClusterView for MemoryCluster {
    async fn node_ids(&self, cluster: ClusterId) -> Result<Vec<NodeId>, SourceError> {
        Ok(self.clusters.get(&cluster).cloned().unwrap_or_default())
    }

    async fn load_node(&self, id: NodeId) -> Result<NodeEntry, SourceError> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("node {id}")))
    }

    async fn load_device(&self, id: DeviceId) -> Result<DeviceEntry, SourceError> {
        self.devices
            .get(&id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("device {id}")))
    }

    fn node_up(&self, id: NodeId) -> bool {
        self.node_health.get(&id).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use mason_types::GB;

    use super::*;

    fn cluster_with(nodes: usize, devices_per_node: usize) -> (MemoryCluster, ClusterId) {
        let cluster_id = ClusterId::generate();
        let mut mc = MemoryCluster::new();
        mc.add_cluster(cluster_id);
        for n in 0..nodes {
            let node = NodeEntry::new(
                cluster_id,
                n as u32 + 1,
                format!("node{n}.mgmt"),
                format!("node{n}.storage"),
            );
            let node_id = node.id;
            mc.add_node(node);
            for d in 0..devices_per_node {
                let mut dev = DeviceEntry::new(node_id, format!("/dev/sd{d}"));
                dev.set_capacity(100 * GB);
                mc.add_device(dev);
            }
        }
        (mc, cluster_id)
    }

    #[tokio::test]
    async fn test_devices_lists_all_online() {
        let (mc, cluster) = cluster_with(3, 2);
        let mut src = CachedSource::new(&mc, cluster);
        let devices = src.devices().await.unwrap();
        assert_eq!(devices.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_cluster() {
        let mc = MemoryCluster::new();
        let cluster = ClusterId::generate();
        let mut src = CachedSource::new(&mc, cluster);
        assert!(matches!(
            src.devices().await,
            Err(SourceError::EmptyCluster)
        ));
    }

    #[tokio::test]
    async fn test_no_storage_when_devices_offline() {
        let (mut mc, cluster) = cluster_with(2, 1);
        let ids: Vec<DeviceId> = mc.devices.keys().copied().collect();
        for id in ids {
            mc.device_mut(id).unwrap().set_state(EntryState::Offline).unwrap();
        }
        let mut src = CachedSource::new(&mc, cluster);
        assert!(matches!(src.devices().await, Err(SourceError::NoStorage)));
    }

    #[tokio::test]
    async fn test_unhealthy_node_excluded() {
        let (mut mc, cluster) = cluster_with(2, 1);
        let sick = *mc.clusters.get(&cluster).unwrap().first().unwrap();
        mc.set_node_health(sick, false);

        let mut src = CachedSource::new(&mc, cluster);
        let devices = src.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_ne!(devices[0].node, sick);
    }

    #[tokio::test]
    async fn test_cache_serves_same_copy() {
        let (mc, cluster) = cluster_with(1, 1);
        let mut src = CachedSource::new(&mc, cluster);
        let id = src.devices().await.unwrap()[0].device;

        src.device(id).await.unwrap().storage_allocate(GB);
        let again = src.device(id).await.unwrap();
        assert_eq!(again.storage.used, GB);

        // The backing view is untouched until the caller persists.
        assert_eq!(mc.device(id).unwrap().storage.used, 0);
    }
}
