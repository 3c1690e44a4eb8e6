//! Placement test suite: placer behavior over in-memory clusters.

use std::collections::BTreeSet;

use async_trait::async_trait;
use mason_types::{
    BrickSubType, ClusterId, DeviceAndNode, DeviceEntry, DeviceId, DurabilityConfig, NodeEntry,
    NodeId, VolumeEntry, ARBITER_TAG, GB, MB,
};

use crate::{
    allocate_volume_bricks, ArbiterBrickPlacer, BrickPlacer, BrickSet, CachedSource, DeviceSource,
    MemoryCluster, PlacementError, SourceError, StandardBrickPlacer, VolumePlacementOpts,
    ZoneFilter,
};

// ---- fixtures ----

struct Fixture {
    cluster: MemoryCluster,
    cluster_id: ClusterId,
    nodes: Vec<NodeId>,
    devices: Vec<DeviceId>,
}

/// A cluster of `node_count` nodes, one zone per node, each with
/// `devices_per_node` devices of `capacity` KiB.
fn fixture(node_count: usize, devices_per_node: usize, capacity: u64) -> Fixture {
    let cluster_id = ClusterId::generate();
    let mut cluster = MemoryCluster::new();
    cluster.add_cluster(cluster_id);

    let mut nodes = Vec::new();
    let mut devices = Vec::new();
    for n in 0..node_count {
        let node = NodeEntry::new(
            cluster_id,
            n as u32 + 1,
            format!("node{n}.mgmt"),
            format!("node{n}.stor"),
        );
        nodes.push(node.id);
        let node_id = node.id;
        cluster.add_node(node);
        for d in 0..devices_per_node {
            let mut dev = DeviceEntry::new(node_id, format!("/dev/sd{d}"));
            dev.set_capacity(capacity);
            devices.push(dev.id);
            cluster.add_device(dev);
        }
    }
    Fixture {
        cluster,
        cluster_id,
        nodes,
        devices,
    }
}

fn volume(cluster_id: ClusterId, size: u64, replica: usize) -> VolumeEntry {
    let mut v = VolumeEntry::new(
        cluster_id,
        "testvol",
        size,
        DurabilityConfig::Replicate { replica },
    );
    v.snapshot_factor = 1.0;
    v
}

fn arbiter_volume(cluster_id: ClusterId, size: u64) -> VolumeEntry {
    let mut v = volume(cluster_id, size, 3);
    v.arbiter = true;
    v
}

fn set_device_ids(set: &BrickSet) -> Vec<DeviceId> {
    set.bricks().map(|b| b.device_id).collect()
}

// ---- standard placer ----

#[tokio::test]
async fn test_standard_places_full_sets_on_distinct_nodes() {
    let fx = fixture(4, 2, 100 * GB);
    let vol = volume(fx.cluster_id, 30 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 2);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);

    let placer = StandardBrickPlacer::new();
    let allocation = placer.place_all(&mut source, &opts, None).await.unwrap();

    assert_eq!(allocation.brick_sets.len(), 2);
    assert_eq!(allocation.brick_count(), 6);
    for (set, dset) in allocation
        .brick_sets
        .iter()
        .zip(allocation.device_sets.iter())
    {
        assert!(set.full());
        assert!(dset.full());
        // One node per brick within a set.
        assert_eq!(set.nodes().len(), 3);
        for (i, brick) in (0..3).map(|i| (i, set.get(i).unwrap())) {
            assert_eq!(brick.sub_type, BrickSubType::Normal);
            assert_eq!(brick.size, 10 * GB);
            assert_eq!(brick.volume_id, vol.id);
            assert_eq!(dset.get(i), Some(brick.device_id));
        }
    }

    // Space was deducted and bricks recorded on the pass-local copies.
    for set in &allocation.brick_sets {
        for brick in set.bricks() {
            let dev = source.cached_device(brick.device_id).unwrap();
            assert!(dev.bricks.contains(&brick.id));
            assert!(dev.storage.used >= brick.total_space());
        }
    }
    // The backing catalog is untouched until the caller persists.
    for id in &fx.devices {
        assert_eq!(fx.cluster.device(*id).unwrap().storage.used, 0);
    }
}

#[tokio::test]
async fn test_standard_no_space_with_too_few_nodes() {
    let fx = fixture(2, 4, 100 * GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);

    let placer = StandardBrickPlacer::new();
    let err = placer.place_all(&mut source, &opts, None).await.unwrap_err();
    assert!(matches!(err, PlacementError::NoSpace));
}

#[tokio::test]
async fn test_standard_layouts_vary_across_runs() {
    let fx = fixture(8, 1, 100 * GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let placer = StandardBrickPlacer::new();

    let mut layouts = BTreeSet::new();
    for _ in 0..5 {
        let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
        let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
        let allocation = placer.place_all(&mut source, &opts, None).await.unwrap();
        layouts.insert(set_device_ids(&allocation.brick_sets[0]));
    }
    // With eight equally eligible devices, five identical layouts in a
    // row would point at a broken ring.
    assert!(layouts.len() > 1, "every run picked the same devices");
}

#[tokio::test]
async fn test_standard_replace_changes_exactly_one_position() {
    let fx = fixture(4, 1, 100 * GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let placer = StandardBrickPlacer::new();

    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let placed = placer.place_all(&mut source, &opts, None).await.unwrap();
    let existing = &placed.brick_sets[0];

    let replaced = placer
        .replace(&mut source, &opts, None, existing, 1)
        .await
        .unwrap();
    assert_eq!(replaced.brick_sets.len(), 1);
    let new_set = &replaced.brick_sets[0];
    assert!(new_set.full());

    for i in [0usize, 2] {
        assert_eq!(new_set.get(i).unwrap().id, existing.get(i).unwrap().id);
    }
    let old = existing.get(1).unwrap();
    let new = new_set.get(1).unwrap();
    assert_ne!(new.id, old.id);
    // The untouched positions' nodes stay off limits.
    assert!(!existing.nodes_except(1).contains(&new.node_id));
    // Deferred bookkeeping: the new device's brick list is untouched.
    let dev = source.cached_device(new.device_id).unwrap();
    assert!(!dev.bricks.contains(&new.id));
}

#[tokio::test]
async fn test_standard_replace_index_out_of_bounds() {
    let fx = fixture(4, 1, 100 * GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let placer = StandardBrickPlacer::new();

    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let placed = placer.place_all(&mut source, &opts, None).await.unwrap();

    let err = placer
        .replace(&mut source, &opts, None, &placed.brick_sets[0], 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlacementError::OutOfBounds { index: 3, set_size: 3 }
    ));
}

#[tokio::test]
async fn test_standard_replace_honors_filter() {
    let fx = fixture(4, 1, 100 * GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let placer = StandardBrickPlacer::new();

    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let placed = placer.place_all(&mut source, &opts, None).await.unwrap();
    let existing = &placed.brick_sets[0];
    let banned = existing.get(0).unwrap().device_id;

    // Ban the device being drained; with four nodes exactly one other
    // device remains legal.
    let filter = move |_: &BrickSet, d: &DeviceEntry| d.id != banned;
    let replaced = placer
        .replace(&mut source, &opts, Some(&filter), existing, 0)
        .await
        .unwrap();
    let new = replaced.brick_sets[0].get(0).unwrap();
    assert_ne!(new.device_id, banned);
}

#[tokio::test]
async fn test_source_error_passthrough() {
    struct FailingSource;

    #[async_trait]
    impl DeviceSource for FailingSource {
        async fn devices(&mut self) -> Result<Vec<DeviceAndNode>, SourceError> {
            Err(SourceError::Backend("backend on fire".into()))
        }
        async fn device(&mut self, _: DeviceId) -> Result<&mut DeviceEntry, SourceError> {
            unreachable!()
        }
        async fn node(&mut self, _: NodeId) -> Result<&mut NodeEntry, SourceError> {
            unreachable!()
        }
    }

    let fx = fixture(1, 1, GB);
    let vol = volume(fx.cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);

    let mut source = FailingSource;
    let err = StandardBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlacementError::Source(SourceError::Backend(_))
    ));

    let err = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlacementError::Source(SourceError::Backend(_))
    ));
}

// ---- zone filter ----

#[tokio::test]
async fn test_zone_filter_spreads_across_zones() {
    // Three zones, two nodes each: a replica-3 set must use all three.
    let cluster_id = ClusterId::generate();
    let mut cluster = MemoryCluster::new();
    cluster.add_cluster(cluster_id);
    for n in 0..6u32 {
        let node = NodeEntry::new(
            cluster_id,
            (n % 3) + 1,
            format!("node{n}.mgmt"),
            format!("node{n}.stor"),
        );
        let node_id = node.id;
        cluster.add_node(node);
        let mut dev = DeviceEntry::new(node_id, "/dev/sdb");
        dev.set_capacity(100 * GB);
        cluster.add_device(dev);
    }

    let vol = volume(cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&cluster, cluster_id);
    let zones = ZoneFilter::build(&mut source).await.unwrap();
    let filter = zones.as_filter();

    let allocation = StandardBrickPlacer::new()
        .place_all(&mut source, &opts, Some(&filter))
        .await
        .unwrap();

    let set = &allocation.brick_sets[0];
    let used_zones: BTreeSet<u32> = set
        .bricks()
        .map(|b| cluster.node(b.node_id).unwrap().zone)
        .collect();
    assert_eq!(used_zones.len(), 3);
}

#[tokio::test]
async fn test_zone_filter_no_space_with_too_few_zones() {
    // Four nodes but only two zones: replica 3 cannot spread.
    let cluster_id = ClusterId::generate();
    let mut cluster = MemoryCluster::new();
    cluster.add_cluster(cluster_id);
    for n in 0..4u32 {
        let node = NodeEntry::new(
            cluster_id,
            (n % 2) + 1,
            format!("node{n}.mgmt"),
            format!("node{n}.stor"),
        );
        let node_id = node.id;
        cluster.add_node(node);
        let mut dev = DeviceEntry::new(node_id, "/dev/sdb");
        dev.set_capacity(100 * GB);
        cluster.add_device(dev);
    }

    let vol = volume(cluster_id, 10 * GB, 3);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&cluster, cluster_id);
    let zones = ZoneFilter::build(&mut source).await.unwrap();
    let filter = zones.as_filter();

    let err = StandardBrickPlacer::new()
        .place_all(&mut source, &opts, Some(&filter))
        .await
        .unwrap_err();
    assert!(matches!(err, PlacementError::NoSpace));
}

// ---- arbiter placer ----

#[tokio::test]
async fn test_arbiter_places_discounted_third_brick() {
    let fx = fixture(4, 1, 100 * GB);
    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);

    let allocation = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap();

    let set = &allocation.brick_sets[0];
    assert!(set.full());
    assert_eq!(set.nodes().len(), 3);

    for i in 0..2 {
        let data = set.get(i).unwrap();
        assert_eq!(data.sub_type, BrickSubType::Normal);
        assert_eq!(data.size, 10 * GB);
    }
    let arb = set.get(2).unwrap();
    assert_eq!(arb.sub_type, BrickSubType::Arbiter);
    // 10 GiB of 64 KiB files, 4 KiB of metadata each.
    assert_eq!(arb.size, 640 * MB);
}

#[tokio::test]
async fn test_arbiter_discount_floor() {
    let fx = fixture(4, 1, 100 * GB);
    let mut vol = arbiter_volume(fx.cluster_id, GB);
    vol.average_file_size = 512 * MB;
    let opts = VolumePlacementOpts::new(&vol, GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);

    let allocation = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap();
    // Two huge files discount to 8 KiB, floored at 16 MiB.
    assert_eq!(allocation.brick_sets[0].get(2).unwrap().size, 16 * MB);
}

#[tokio::test]
async fn test_arbiter_average_file_size_too_large() {
    let fx = fixture(4, 1, 100 * GB);
    let mut vol = arbiter_volume(fx.cluster_id, GB);
    vol.average_file_size = 2 * GB;
    let opts = VolumePlacementOpts::new(&vol, GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);

    let err = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlacementError::ArbiterDiscount { .. }));
}

#[tokio::test]
async fn test_arbiter_respects_device_tags() {
    let mut fx = fixture(4, 1, 100 * GB);
    // One device may only host arbiter bricks; the rest only data.
    let arbiter_device = fx.devices[0];
    for (i, id) in fx.devices.iter().enumerate() {
        let value = if i == 0 { "required" } else { "disabled" };
        fx.cluster
            .device_mut(*id)
            .unwrap()
            .tags
            .insert(ARBITER_TAG.into(), value.into());
    }

    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let placer = ArbiterBrickPlacer::new();
    for _ in 0..5 {
        let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
        let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
        let allocation = placer.place_all(&mut source, &opts, None).await.unwrap();
        let set = &allocation.brick_sets[0];
        assert_eq!(set.get(2).unwrap().device_id, arbiter_device);
        assert_ne!(set.get(0).unwrap().device_id, arbiter_device);
        assert_ne!(set.get(1).unwrap().device_id, arbiter_device);
    }
}

#[tokio::test]
async fn test_arbiter_node_tag_fallback() {
    let mut fx = fixture(4, 1, 100 * GB);
    // Tag nodes, not devices: the device inherits its node's role.
    for (i, id) in fx.nodes.iter().enumerate() {
        let value = if i == 0 { "required" } else { "disabled" };
        let mut node = fx.cluster.node(*id).unwrap().clone();
        node.tags.insert(ARBITER_TAG.into(), value.into());
        fx.cluster.put_node(node);
    }

    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let allocation = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap();
    let arb = allocation.brick_sets[0].get(2).unwrap();
    assert_eq!(arb.node_id, fx.nodes[0]);
}

#[tokio::test]
async fn test_arbiter_no_capable_device() {
    let mut fx = fixture(4, 1, 100 * GB);
    for id in &fx.devices {
        fx.cluster
            .device_mut(*id)
            .unwrap()
            .tags
            .insert(ARBITER_TAG.into(), "disabled".into());
    }

    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let err = ArbiterBrickPlacer::new()
        .place_all(&mut source, &opts, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlacementError::NoSpace));
}

#[tokio::test]
async fn test_arbiter_replace_keeps_roles() {
    let fx = fixture(5, 1, 100 * GB);
    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let placer = ArbiterBrickPlacer::new();

    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let placed = placer.place_all(&mut source, &opts, None).await.unwrap();
    let existing = &placed.brick_sets[0];

    // Replacing the arbiter slot yields another discounted arbiter.
    let replaced = placer
        .replace(&mut source, &opts, None, existing, 2)
        .await
        .unwrap();
    let new_arb = replaced.brick_sets[0].get(2).unwrap();
    assert_eq!(new_arb.sub_type, BrickSubType::Arbiter);
    assert_eq!(new_arb.size, 640 * MB);
    assert_ne!(new_arb.id, existing.get(2).unwrap().id);

    // Replacing a data slot yields a full-size data brick.
    let replaced = placer
        .replace(&mut source, &opts, None, existing, 0)
        .await
        .unwrap();
    let new_data = replaced.brick_sets[0].get(0).unwrap();
    assert_eq!(new_data.sub_type, BrickSubType::Normal);
    assert_eq!(new_data.size, 10 * GB);
}

#[tokio::test]
async fn test_arbiter_replace_no_replacement_available() {
    // Only one arbiter-capable device; draining it leaves nowhere to go.
    let mut fx = fixture(5, 1, 100 * GB);
    let arbiter_device = fx.devices[4];
    for (i, id) in fx.devices.iter().enumerate() {
        let value = if i == 4 { "required" } else { "disabled" };
        fx.cluster
            .device_mut(*id)
            .unwrap()
            .tags
            .insert(ARBITER_TAG.into(), value.into());
    }

    let vol = arbiter_volume(fx.cluster_id, 10 * GB);
    let opts = VolumePlacementOpts::new(&vol, 10 * GB, 1);
    let placer = ArbiterBrickPlacer::new();

    let mut source = CachedSource::new(&fx.cluster, fx.cluster_id);
    let placed = placer.place_all(&mut source, &opts, None).await.unwrap();
    let existing = &placed.brick_sets[0];
    assert_eq!(existing.get(2).unwrap().device_id, arbiter_device);

    let filter = move |_: &BrickSet, d: &DeviceEntry| d.id != arbiter_device;
    let err = placer
        .replace(&mut source, &opts, Some(&filter), existing, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, PlacementError::NoSpace));

    // A data slot can still be replaced: two data nodes are unused.
    let replaced = placer
        .replace(&mut source, &opts, Some(&filter), existing, 1)
        .await
        .unwrap();
    assert!(replaced.brick_sets[0].full());
}

// ---- allocation driver ----

#[tokio::test]
async fn test_allocate_halves_bricks_until_layout_fits() {
    // 8 GiB bricks exceed every device; 4 GiB bricks fit one per device.
    let fx = fixture(6, 1, 5 * GB);
    let vol = volume(fx.cluster_id, 8 * GB, 3);

    let placer = StandardBrickPlacer::new();
    let (allocation, source) = allocate_volume_bricks(&fx.cluster, &vol, &placer, None)
        .await
        .unwrap();

    assert_eq!(allocation.brick_sets.len(), 2);
    for set in &allocation.brick_sets {
        for brick in set.bricks() {
            assert_eq!(brick.size, 4 * GB);
        }
    }

    // Persisting the pass writes the deductions back.
    let (devices, _nodes) = source.into_entries();
    let mut fx = fx;
    for dev in devices {
        fx.cluster.put_device(dev);
    }
    let used: u64 = fx
        .devices
        .iter()
        .map(|id| fx.cluster.device(*id).unwrap().storage.used)
        .sum();
    assert!(used >= 6 * 4 * GB);
}

#[tokio::test]
async fn test_allocate_minimum_brick_size() {
    let fx = fixture(3, 1, GB);
    let vol = volume(fx.cluster_id, 2 * GB, 3);

    let placer = StandardBrickPlacer::new();
    let result = allocate_volume_bricks(&fx.cluster, &vol, &placer, None).await;
    assert!(matches!(result, Err(PlacementError::MinimumBrickSize)));

    // Failed attempts leave the catalog untouched.
    for id in &fx.devices {
        assert_eq!(fx.cluster.device(*id).unwrap().storage.used, 0);
    }
}
