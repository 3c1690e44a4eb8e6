//! Persistence seam for operations.

use async_trait::async_trait;
use mason_placement::{ClusterView, MemoryCluster, SourceError};
use mason_types::{BrickEntry, BrickId, DeviceEntry, NodeEntry, VolumeEntry, VolumeId};

/// Topology access plus the writes an operation commits.
///
/// Reads hand out owned copies, like [`ClusterView`]; `save_*` persist
/// mutated copies back. An operation performs all remote work first and
/// saves only once the remote side has accepted it.
#[async_trait]
pub trait ControlStore: ClusterView {
    async fn load_volume(&self, id: VolumeId) -> Result<VolumeEntry, SourceError>;
    async fn load_brick(&self, id: BrickId) -> Result<BrickEntry, SourceError>;

    async fn save_device(&mut self, device: DeviceEntry) -> Result<(), SourceError>;
    async fn save_node(&mut self, node: NodeEntry) -> Result<(), SourceError>;
    async fn save_volume(&mut self, volume: VolumeEntry) -> Result<(), SourceError>;
    async fn save_brick(&mut self, brick: BrickEntry) -> Result<(), SourceError>;
    async fn delete_brick(&mut self, id: BrickId) -> Result<(), SourceError>;
}

#[async_trait]
impl ControlStore for MemoryCluster {
    async fn load_volume(&self, id: VolumeId) -> Result<VolumeEntry, SourceError> {
        self.volume(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("volume {id}")))
    }

    async fn load_brick(&self, id: BrickId) -> Result<BrickEntry, SourceError> {
        self.brick(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("brick {id}")))
    }

    async fn save_device(&mut self, device: DeviceEntry) -> Result<(), SourceError> {
        self.put_device(device);
        Ok(())
    }

    async fn save_node(&mut self, node: NodeEntry) -> Result<(), SourceError> {
        self.put_node(node);
        Ok(())
    }

    async fn save_volume(&mut self, volume: VolumeEntry) -> Result<(), SourceError> {
        self.put_volume(volume);
        Ok(())
    }

    async fn save_brick(&mut self, brick: BrickEntry) -> Result<(), SourceError> {
        self.put_brick(brick);
        Ok(())
    }

    async fn delete_brick(&mut self, id: BrickId) -> Result<(), SourceError> {
        self.remove_brick(&id);
        Ok(())
    }
}
