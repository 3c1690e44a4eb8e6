//! A simulated brick executor.
//!
//! Dry-run commands run the real workflows against this executor: it
//! keeps volume layouts in memory, applies swaps to them, and reports
//! every action through tracing instead of touching a host.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mason_ops::{
    BrickExecutor, BrickHealth, BrickRequest, ExecutorError, RemoteBrick, RemoteVolume,
};
use tracing::info;

#[derive(Debug, Default)]
pub struct SimExecutor {
    layouts: Mutex<HashMap<String, RemoteVolume>>,
}

impl SimExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_layout(&self, layout: RemoteVolume) {
        self.layouts
            .lock()
            .expect("lock poisoned")
            .insert(layout.name.clone(), layout);
    }
}

#[async_trait]
impl BrickExecutor for SimExecutor {
    async fn create_brick(&self, host: &str, brick: &BrickRequest) -> Result<(), ExecutorError> {
        info!(host, path = %brick.path, size = brick.size, "sim: create brick");
        Ok(())
    }

    async fn destroy_brick(
        &self,
        host: &str,
        brick: &BrickRequest,
    ) -> Result<bool, ExecutorError> {
        info!(host, path = %brick.path, "sim: destroy brick");
        Ok(true)
    }

    async fn replace_brick(
        &self,
        host: &str,
        volume: &str,
        old: &RemoteBrick,
        new: &RemoteBrick,
    ) -> Result<(), ExecutorError> {
        info!(host, volume, old = %old.path, new = %new.path, "sim: replace brick");
        let mut layouts = self.layouts.lock().expect("lock poisoned");
        let layout = layouts
            .get_mut(volume)
            .ok_or_else(|| ExecutorError::UnknownVolume(volume.into()))?;
        let slot = layout
            .bricks
            .iter_mut()
            .find(|b| **b == *old)
            .ok_or_else(|| ExecutorError::UnknownVolume(volume.into()))?;
        *slot = new.clone();
        Ok(())
    }

    async fn volume_info(&self, _host: &str, volume: &str) -> Result<RemoteVolume, ExecutorError> {
        self.layouts
            .lock()
            .expect("lock poisoned")
            .get(volume)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownVolume(volume.into()))
    }

    async fn heal_status(
        &self,
        _host: &str,
        volume: &str,
    ) -> Result<Vec<BrickHealth>, ExecutorError> {
        // Simulated bricks are always reachable and fully healed.
        let layouts = self.layouts.lock().expect("lock poisoned");
        let layout = layouts
            .get(volume)
            .ok_or_else(|| ExecutorError::UnknownVolume(volume.into()))?;
        Ok(layout
            .bricks
            .iter()
            .map(|b| BrickHealth {
                brick: b.clone(),
                connected: true,
                pending: 0,
            })
            .collect())
    }
}
