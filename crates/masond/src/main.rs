//! `masond` — the mason capacity-planning daemon.
//!
//! Binary entrypoint for placement dry runs over a declared topology.
//!
//! # Usage
//!
//! ```text
//! masond topology -t cluster.toml            # inspect a topology file
//! masond plan -t cluster.toml -s 500         # plan a 500 GiB volume
//! masond plan -t cluster.toml -s 500 --arbiter --zone-spread
//! masond drain -t cluster.toml -s 500 -d node0:/dev/sdb
//! ```

mod config;
mod sim;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mason_ops::{DeviceRemoval, MemoryIntentLog, RemoteBrick, RemoteVolume};
use mason_placement::{
    allocate_volume_bricks, placer_for_volume, BrickAllocation, CachedSource, DeviceFilter,
    ZoneFilter,
};
use mason_types::{DurabilityConfig, EntryState, VolumeEntry, GB};
use tracing::info;

use config::{CliConfig, Topology};
use sim::SimExecutor;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "masond", version, about = "Mason capacity planner")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a parsed topology.
    Topology {
        /// Topology TOML file.
        #[arg(short, long)]
        topology: PathBuf,
    },

    /// Plan the brick layout for a new volume.
    Plan {
        /// Topology TOML file.
        #[arg(short, long)]
        topology: PathBuf,

        /// Requested volume size in GiB.
        #[arg(short, long)]
        size: u64,

        /// Replica count per set.
        #[arg(short, long, default_value = "3")]
        replica: usize,

        /// Place a metadata-only arbiter brick per set.
        #[arg(long)]
        arbiter: bool,

        /// Keep the bricks of a set in distinct failure zones.
        #[arg(long)]
        zone_spread: bool,
    },

    /// Simulate draining a device: plan a volume, then migrate every
    /// brick off one of its devices.
    Drain {
        /// Topology TOML file.
        #[arg(short, long)]
        topology: PathBuf,

        /// Volume size in GiB to provision before draining.
        #[arg(short, long)]
        size: u64,

        /// Replica count per set.
        #[arg(short, long, default_value = "3")]
        replica: usize,

        /// Device to drain, as `node-name:device-name`.
        #[arg(short, long)]
        device: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Topology { topology } => cmd_topology(&topology),
        Commands::Plan {
            topology,
            size,
            replica,
            arbiter,
            zone_spread,
        } => cmd_plan(&config, &topology, size, replica, arbiter, zone_spread).await,
        Commands::Drain {
            topology,
            size,
            replica,
            device,
        } => cmd_drain(&config, &topology, size, replica, &device).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// masond topology
// -----------------------------------------------------------------------

fn cmd_topology(path: &std::path::Path) -> Result<()> {
    let topo = Topology::load(path)?;
    println!("cluster {}", topo.cluster_id);
    for (node_id, name) in &topo.node_names {
        let node = topo
            .cluster
            .node(*node_id)
            .context("node missing from catalog")?;
        println!(
            "  node {name} (zone {}, manage {}, storage {})",
            node.zone, node.manage_hostname, node.storage_hostname
        );
        for device_id in &node.devices {
            let device = topo
                .cluster
                .device(*device_id)
                .context("device missing from catalog")?;
            println!(
                "    device {} ({} GiB free of {} GiB)",
                device.name,
                device.storage.free / GB,
                device.storage.total / GB
            );
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// masond plan
// -----------------------------------------------------------------------

async fn cmd_plan(
    config: &CliConfig,
    topology: &std::path::Path,
    size_gb: u64,
    replica: usize,
    arbiter: bool,
    zone_spread: bool,
) -> Result<()> {
    let topo = Topology::load(topology)?;
    let vol = new_volume(config, &topo, size_gb, replica, arbiter)?;

    let zone_spread = zone_spread || config.placement.zone_spread;
    let (allocation, _) = place_volume(&topo, &vol, zone_spread).await?;
    print_allocation(&topo, &allocation);

    let footprint: u64 = allocation
        .brick_sets
        .iter()
        .flat_map(|set| set.bricks())
        .map(|brick| brick.total_space())
        .sum();
    println!("total footprint: {} GiB", footprint / GB);
    Ok(())
}

/// Build the volume entry a command plans for.
fn new_volume(
    config: &CliConfig,
    topo: &Topology,
    size_gb: u64,
    replica: usize,
    arbiter: bool,
) -> Result<VolumeEntry> {
    if size_gb == 0 {
        bail!("volume size must be non-zero");
    }
    if arbiter && replica != 3 {
        bail!("arbiter volumes are replica-3");
    }
    let mut vol = VolumeEntry::new(
        topo.cluster_id,
        "",
        size_gb * GB,
        DurabilityConfig::Replicate { replica },
    );
    vol.snapshot_factor = config.placement.snapshot_factor;
    vol.arbiter = arbiter;
    Ok(vol)
}

/// Run the allocation driver for a volume over a topology.
async fn place_volume<'t>(
    topo: &'t Topology,
    vol: &VolumeEntry,
    zone_spread: bool,
) -> Result<(
    BrickAllocation,
    CachedSource<'t, mason_placement::MemoryCluster>,
)> {
    let placer = placer_for_volume(vol);

    let zones = if zone_spread {
        let mut source = CachedSource::new(&topo.cluster, topo.cluster_id);
        Some(ZoneFilter::build(&mut source).await?)
    } else {
        None
    };
    let zone_filter = zones.as_ref().map(|z| z.as_filter());
    let filter: Option<DeviceFilter<'_>> = match zone_filter.as_ref() {
        Some(f) => Some(f),
        None => None,
    };

    allocate_volume_bricks(&topo.cluster, vol, placer.as_ref(), filter)
        .await
        .context("no layout fits this topology")
}

fn print_allocation(topo: &Topology, allocation: &BrickAllocation) {
    println!(
        "planned {} set(s), {} brick(s):",
        allocation.brick_sets.len(),
        allocation.brick_count()
    );
    for (set_index, set) in allocation.brick_sets.iter().enumerate() {
        println!("  set {set_index}:");
        for position in 0..set.set_size() {
            let Some(brick) = set.get(position) else {
                continue;
            };
            let node = topo
                .node_names
                .get(&brick.node_id)
                .map(String::as_str)
                .unwrap_or("?");
            let device = topo
                .cluster
                .device(brick.device_id)
                .map(|d| d.name.as_str())
                .unwrap_or("?");
            println!(
                "    [{position}] {node}:{device}  {:?} {} GiB  {}",
                brick.sub_type,
                brick.size / GB,
                brick.path
            );
        }
    }
}

/// Persist an allocation into the topology's catalog and register the
/// simulated remote layout. Returns the layout for the executor.
fn persist_allocation(
    topo: &mut Topology,
    vol: &mut VolumeEntry,
    allocation: &BrickAllocation,
    devices: Vec<mason_types::DeviceEntry>,
    nodes: Vec<mason_types::NodeEntry>,
) -> Result<RemoteVolume> {
    for device in devices {
        topo.cluster.put_device(device);
    }
    for node in nodes {
        topo.cluster.put_node(node);
    }

    let mut layout = Vec::new();
    for set in &allocation.brick_sets {
        for brick in set.bricks() {
            vol.brick_add(brick.id);
            let host = topo
                .cluster
                .node(brick.node_id)
                .context("placed brick on unknown node")?
                .storage_hostname
                .clone();
            layout.push(RemoteBrick {
                host,
                path: brick.path.clone(),
            });
            topo.cluster.add_brick(brick.clone());
        }
    }
    topo.cluster.add_volume(vol.clone());
    Ok(RemoteVolume {
        name: vol.name.clone(),
        bricks: layout,
    })
}

// -----------------------------------------------------------------------
// masond drain
// -----------------------------------------------------------------------

async fn cmd_drain(
    config: &CliConfig,
    topology: &std::path::Path,
    size_gb: u64,
    replica: usize,
    device_name: &str,
) -> Result<()> {
    let mut topo = Topology::load(topology)?;
    let device_id = *topo
        .devices_by_name
        .get(device_name)
        .with_context(|| format!("unknown device {device_name} (use node-name:device-name)"))?;

    // Provision a volume so the drain has bricks to move.
    let mut vol = new_volume(config, &topo, size_gb, replica, false)?;
    let (allocation, source) = place_volume(&topo, &vol, false).await?;
    let (devices, nodes) = source.into_entries();
    let layout = persist_allocation(&mut topo, &mut vol, &allocation, devices, nodes)?;
    print_allocation(&topo, &allocation);

    let executor = SimExecutor::new();
    executor.set_layout(layout);

    let target = topo
        .cluster
        .device_mut(device_id)
        .context("device missing from catalog")?;
    let brick_count = target.bricks.len();
    target
        .set_state(EntryState::Offline)
        .context("device cannot go offline")?;
    info!(device = %device_id, bricks = brick_count, "draining device");

    let intent = MemoryIntentLog::new();
    let mut op = DeviceRemoval::build(&topo.cluster, &intent, device_id)
        .await
        .context("removal refused")?;
    if let Err(err) = op.exec(&mut topo.cluster, &executor).await {
        op.rollback(&executor, &intent)
            .await
            .context("rollback failed")?;
        return Err(err).context("drain failed; rolled back");
    }
    op.finalize(&mut topo.cluster, &intent)
        .await
        .context("finalize failed")?;

    let device = topo
        .cluster
        .device(device_id)
        .context("device missing from catalog")?;
    println!(
        "drained {} brick(s); device {} is now {}",
        brick_count, device_name, device.state
    );

    let vol_after = topo
        .cluster
        .volume(vol.id)
        .context("volume missing from catalog")?;
    println!("volume {} now backed by:", vol_after.name);
    for brick_id in &vol_after.bricks {
        let brick = topo
            .cluster
            .brick(*brick_id)
            .context("brick missing from catalog")?;
        let node = topo
            .node_names
            .get(&brick.node_id)
            .map(String::as_str)
            .unwrap_or("?");
        println!("  {node}  {}", brick.path);
    }
    Ok(())
}
