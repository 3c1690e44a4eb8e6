//! Device removal.
//!
//! Draining a device migrates every brick it hosts onto a replacement
//! placed elsewhere in the cluster, then marks the device failed. The
//! workflow is split into explicit phases so a crash or a remote
//! failure always leaves a recoverable state:
//!
//! - `build` validates the request and records a durable intent;
//! - `exec` migrates the bricks, one at a time, remote-first: a swap
//!   touches the store only after every remote call for it succeeded;
//! - `finalize` marks the drained device failed and clears the intent;
//! - `rollback` destroys any replacement brick whose swap did not
//!   commit and clears the intent, leaving the device untouched.

use mason_placement::{
    placer_for_volume, BrickSet, CachedSource, DeviceFilter, PlacementError, VolumePlacementOpts,
};
use mason_types::{BrickEntry, BrickId, ClusterId, DeviceEntry, DeviceId, EntryState, VolumeEntry};
use tracing::{debug, info, warn};

use crate::error::OpError;
use crate::executor::{BrickExecutor, BrickRequest, RemoteBrick};
use crate::intent::IntentLog;
use crate::store::ControlStore;

/// Where a removal stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPhase {
    /// Validated and claimed, nothing migrated yet.
    Building,
    /// Migrations in flight (or failed partway).
    Executing,
    /// All bricks migrated, device failed, intent cleared.
    Committed,
    /// Abandoned; replacements destroyed, intent cleared.
    RolledBack,
}

/// A device-removal operation.
#[derive(Debug)]
pub struct DeviceRemoval {
    device_id: DeviceId,
    cluster_id: ClusterId,
    bricks: Vec<BrickId>,
    phase: RemovalPhase,
    /// Replacement bricks created on a host but not yet swapped into
    /// their volume; rollback destroys these and only these.
    created: Vec<(String, BrickRequest)>,
}

impl DeviceRemoval {
    /// Validate the request and claim the device.
    ///
    /// The device must be administratively offline; a pending removal
    /// for the same device fails with [`OpError::Conflict`]. A device
    /// without bricks is not claimed at all: its removal performs no
    /// remote work.
    pub async fn build<S>(
        store: &S,
        intent: &dyn IntentLog,
        device_id: DeviceId,
    ) -> Result<Self, OpError>
    where
        S: ControlStore + ?Sized,
    {
        let device = store.load_device(device_id).await?;
        if device.state != EntryState::Offline {
            return Err(OpError::DeviceNotOffline);
        }
        let node = store.load_node(device.node_id).await?;

        // An empty device needs no migrations, so nothing durable to
        // recover from; exec and finalize fall straight through.
        if !device.bricks.is_empty() {
            intent.begin_remove(device_id).await?;
        }
        info!(
            device = %device_id,
            bricks = device.bricks.len(),
            "device removal claimed"
        );

        Ok(Self {
            device_id,
            cluster_id: node.cluster_id,
            bricks: device.bricks,
            phase: RemovalPhase::Building,
            created: Vec::new(),
        })
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn phase(&self) -> RemovalPhase {
        self.phase
    }

    /// Migrate every brick off the device.
    ///
    /// An empty device completes without a single remote call. On error
    /// the operation stays in `Executing`; the caller decides between
    /// retrying and [`DeviceRemoval::rollback`].
    pub async fn exec<S, E>(&mut self, store: &mut S, executor: &E) -> Result<(), OpError>
    where
        S: ControlStore,
        E: BrickExecutor + ?Sized,
    {
        assert_eq!(
            self.phase,
            RemovalPhase::Building,
            "exec follows build exactly once"
        );
        self.phase = RemovalPhase::Executing;

        if self.bricks.is_empty() {
            info!(device = %self.device_id, "device holds no bricks; nothing to migrate");
            return Ok(());
        }

        for brick_id in self.bricks.clone() {
            self.migrate_brick(store, executor, brick_id).await?;
        }
        Ok(())
    }

    /// Mark the drained device failed and release the claim.
    pub async fn finalize<S>(&mut self, store: &mut S, intent: &dyn IntentLog) -> Result<(), OpError>
    where
        S: ControlStore,
    {
        assert_eq!(
            self.phase,
            RemovalPhase::Executing,
            "finalize follows a successful exec"
        );

        let mut device = store.load_device(self.device_id).await?;
        device.force_fail();
        store.save_device(device).await?;
        intent.finish_remove(self.device_id).await?;
        self.phase = RemovalPhase::Committed;
        info!(device = %self.device_id, "device removal committed");
        Ok(())
    }

    /// Abandon the removal: destroy uncommitted replacement bricks and
    /// release the claim. The device keeps its state and its bricks.
    pub async fn rollback<E>(
        &mut self,
        executor: &E,
        intent: &dyn IntentLog,
    ) -> Result<(), OpError>
    where
        E: BrickExecutor + ?Sized,
    {
        for (host, request) in self.created.drain(..) {
            if let Err(err) = executor.destroy_brick(&host, &request).await {
                // The brick stays orphaned on the host; nothing in the
                // store references it.
                warn!(
                    brick = %request.brick_id,
                    host,
                    %err,
                    "failed to destroy replacement brick during rollback"
                );
            }
        }
        intent.finish_remove(self.device_id).await?;
        self.phase = RemovalPhase::RolledBack;
        info!(device = %self.device_id, "device removal rolled back");
        Ok(())
    }

    async fn migrate_brick<S, E>(
        &mut self,
        store: &mut S,
        executor: &E,
        brick_id: BrickId,
    ) -> Result<(), OpError>
    where
        S: ControlStore,
        E: BrickExecutor + ?Sized,
    {
        let old_brick = store.load_brick(brick_id).await?;
        if old_brick.path.is_empty() {
            // Entries imported from legacy catalogs may lack a path;
            // they cannot be addressed on the remote side.
            warn!(brick = %brick_id, "brick has no path; skipping migration");
            return Ok(());
        }

        let volume = store.load_volume(old_brick.volume_id).await?;
        let host = management_host(store, self.cluster_id).await?;

        let layout = executor.volume_info(&host, &volume.name).await?;
        let old_node = store.load_node(old_brick.node_id).await?;
        let old_remote = RemoteBrick {
            host: old_node.storage_hostname.clone(),
            path: old_brick.path.clone(),
        };
        let position = layout
            .bricks
            .iter()
            .position(|b| *b == old_remote)
            .ok_or_else(|| {
                OpError::NotFound(format!(
                    "brick {brick_id} in the layout of volume {}",
                    volume.name
                ))
            })?;

        let set_size = volume.set_size();
        let set_start = (position / set_size) * set_size;
        let index = position % set_size;
        if layout.bricks.len() < set_start + set_size {
            return Err(OpError::NotFound(format!(
                "full brick set at position {position} of volume {}",
                volume.name
            )));
        }

        // A swap during self-heal would race the healer over the same
        // files, and pulling a brick out of a set that has already lost
        // peers would drop it below quorum.
        let health = executor.heal_status(&host, &volume.name).await?;
        let set_slice = &layout.bricks[set_start..set_start + set_size];
        let mut healthy_peers = 0;
        for remote in set_slice {
            match health.iter().find(|h| h.brick == *remote) {
                Some(h) if h.pending > 0 => return Err(OpError::HealPending),
                Some(h) if h.connected && *remote != old_remote => healthy_peers += 1,
                _ => {}
            }
        }
        if healthy_peers < volume.durability.quorum() {
            return Err(OpError::DegradedSet);
        }

        let mut existing = BrickSet::new(set_size);
        for (i, remote) in set_slice.iter().enumerate() {
            existing.insert(i, resolve_brick(store, &volume, remote).await?);
        }

        // Place the replacement, never back onto the drained device.
        // Arbiter discounts are derived from the data brick size, so
        // hand the placer the set's largest brick.
        let data_size = existing
            .bricks()
            .map(|b| b.size)
            .max()
            .unwrap_or(old_brick.size);
        let opts = VolumePlacementOpts::new(&volume, data_size, 1);
        let placer = placer_for_volume(&volume);
        let drained = self.device_id;
        let exclude_drained = move |_: &BrickSet, d: &DeviceEntry| d.id != drained;
        let filter: DeviceFilter<'_> = &exclude_drained;

        let mut source = CachedSource::new(&*store, self.cluster_id);
        let allocation = match placer
            .replace(&mut source, &opts, Some(filter), &existing, index)
            .await
        {
            Ok(allocation) => allocation,
            Err(PlacementError::NoSpace) => return Err(OpError::NoReplacement),
            Err(err) => return Err(err.into()),
        };
        let new_brick = allocation.brick_sets[0]
            .get(index)
            .cloned()
            .expect("replace fills the requested slot");
        let (mutated_devices, _) = source.into_entries();

        let new_node = store.load_node(new_brick.node_id).await?;
        let new_remote = RemoteBrick {
            host: new_node.storage_hostname.clone(),
            path: new_brick.path.clone(),
        };
        let new_request = BrickRequest::from_entry(&new_brick);
        let old_request = BrickRequest::from_entry(&old_brick);

        debug!(
            old = %old_brick.id,
            new = %new_brick.id,
            volume = %volume.name,
            "migrating brick"
        );

        executor
            .create_brick(&new_node.manage_hostname, &new_request)
            .await?;
        self.created
            .push((new_node.manage_hostname.clone(), new_request));

        executor
            .replace_brick(&host, &volume.name, &old_remote, &new_remote)
            .await?;
        // The volume now serves from the replacement; a rollback past
        // this point must leave it alone and recover forward.
        self.created.pop();

        let reclaimed = executor
            .destroy_brick(&old_node.manage_hostname, &old_request)
            .await?;

        // The remote side has swapped; commit the bookkeeping.
        let mut new_device = mutated_devices
            .into_iter()
            .find(|d| d.id == new_brick.device_id)
            .expect("placement cached the chosen device");
        new_device.brick_add(new_brick.id);
        store.save_device(new_device).await?;

        let mut old_device = store.load_device(old_brick.device_id).await?;
        if reclaimed {
            old_device.free_brick(&old_brick);
        } else {
            old_device.brick_delete(&old_brick.id);
        }
        store.save_device(old_device).await?;

        let mut volume = volume;
        volume.brick_delete(&old_brick.id);
        volume.brick_add(new_brick.id);
        store.save_volume(volume).await?;

        store.save_brick(new_brick).await?;
        store.delete_brick(old_brick.id).await?;

        info!(brick = %brick_id, device = %self.device_id, "brick migrated");
        Ok(())
    }
}

/// The management host operations go through: the first online,
/// healthy node of the cluster in id order.
async fn management_host<S>(store: &S, cluster: ClusterId) -> Result<String, OpError>
where
    S: ControlStore + ?Sized,
{
    let mut ids = store.node_ids(cluster).await?;
    ids.sort();
    for id in ids {
        if !store.node_up(id) {
            continue;
        }
        let node = store.load_node(id).await?;
        if node.state == EntryState::Online {
            return Ok(node.manage_hostname);
        }
    }
    Err(OpError::NotFound(format!(
        "an online node in cluster {cluster}"
    )))
}

/// Match a brick from the remote layout back to its store entry.
async fn resolve_brick<S>(
    store: &S,
    volume: &VolumeEntry,
    remote: &RemoteBrick,
) -> Result<BrickEntry, OpError>
where
    S: ControlStore + ?Sized,
{
    for id in &volume.bricks {
        let brick = store.load_brick(*id).await?;
        if brick.path != remote.path {
            continue;
        }
        let node = store.load_node(brick.node_id).await?;
        if node.storage_hostname == remote.host {
            return Ok(brick);
        }
    }
    Err(OpError::NotFound(format!(
        "brick {}:{} of volume {}",
        remote.host, remote.path, volume.name
    )))
}
