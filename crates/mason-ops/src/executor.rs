//! The remote execution seam.
//!
//! Operations talk to storage hosts through a [`BrickExecutor`]. The
//! trait deals in plain host names and brick descriptions; wiring it to
//! ssh or a node agent is the embedder's business.

use async_trait::async_trait;
use mason_types::{BrickEntry, BrickId, BrickSubType, DeviceId};

use crate::error::ExecutorError;

/// Everything a host needs to create or destroy one brick.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickRequest {
    pub brick_id: BrickId,
    pub device_id: DeviceId,
    pub path: String,
    /// Usable size in KiB.
    pub size: u64,
    pub tp_size: u64,
    pub pool_metadata_size: u64,
    pub gid: i64,
    pub sub_type: BrickSubType,
}

impl BrickRequest {
    /// Build a request from a typed brick entry.
    ///
    /// Panics on an untyped brick: a brick must be assigned its role
    /// before it is shipped to a host.
    pub fn from_entry(brick: &BrickEntry) -> Self {
        assert!(
            brick.sub_type != BrickSubType::Unknown,
            "untyped brick {} handed to executor",
            brick.id
        );
        Self {
            brick_id: brick.id,
            device_id: brick.device_id,
            path: brick.path.clone(),
            size: brick.size,
            tp_size: brick.tp_size,
            pool_metadata_size: brick.pool_metadata_size,
            gid: brick.gid,
            sub_type: brick.sub_type,
        }
    }
}

/// One brick as the remote volume layout reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBrick {
    /// Storage hostname of the brick's node.
    pub host: String,
    /// Brick mount path on that host.
    pub path: String,
}

/// A volume's layout as the remote side reports it: bricks in
/// positional order, sets laid out back to back.
#[derive(Debug, Clone)]
pub struct RemoteVolume {
    pub name: String,
    pub bricks: Vec<RemoteBrick>,
}

/// Self-heal status of one brick, from the remote heal report.
#[derive(Debug, Clone)]
pub struct BrickHealth {
    pub brick: RemoteBrick,
    /// Whether the brick process is reachable.
    pub connected: bool,
    /// Entries self-heal still has to process on this brick.
    pub pending: u64,
}

/// Remote operations against storage hosts.
#[async_trait]
pub trait BrickExecutor: Send + Sync {
    /// Provision a brick on `host`.
    async fn create_brick(&self, host: &str, brick: &BrickRequest) -> Result<(), ExecutorError>;

    /// Tear a brick down on `host`. Returns whether the underlying
    /// space was actually reclaimed.
    async fn destroy_brick(&self, host: &str, brick: &BrickRequest)
        -> Result<bool, ExecutorError>;

    /// Swap `old` for `new` in the live volume.
    async fn replace_brick(
        &self,
        host: &str,
        volume: &str,
        old: &RemoteBrick,
        new: &RemoteBrick,
    ) -> Result<(), ExecutorError>;

    /// The volume's current brick layout.
    async fn volume_info(&self, host: &str, volume: &str) -> Result<RemoteVolume, ExecutorError>;

    /// Per-brick self-heal status for the volume.
    async fn heal_status(&self, host: &str, volume: &str)
        -> Result<Vec<BrickHealth>, ExecutorError>;
}
