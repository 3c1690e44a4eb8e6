//! TOML configuration and topology files for the mason daemon.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use mason_placement::MemoryCluster;
use mason_types::{ClusterId, DeviceEntry, DeviceId, NodeEntry, GB};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Placement defaults.
    pub placement: PlacementSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[placement]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    /// Spread the bricks of a set across failure zones.
    pub zone_spread: bool,
    /// Thin-pool snapshot factor applied to new volumes.
    pub snapshot_factor: f64,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            zone_spread: false,
            snapshot_factor: 1.0,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a file, or defaults when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

// -----------------------------------------------------------------------
// Topology files
// -----------------------------------------------------------------------

/// A cluster topology, parsed from TOML.
///
/// ```toml
/// [[nodes]]
/// name = "node0"
/// zone = 1
/// manage = "node0.mgmt.example"
/// storage = "node0.stor.example"
///
/// [nodes.tags]
/// arbiter = "disabled"
///
/// [[nodes.devices]]
/// name = "/dev/sdb"
/// capacity_gb = 500
/// ```
#[derive(Debug, Deserialize)]
pub struct TopologyFile {
    pub nodes: Vec<TopologyNode>,
}

#[derive(Debug, Deserialize)]
pub struct TopologyNode {
    pub name: String,
    pub zone: u32,
    pub manage: String,
    pub storage: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub devices: Vec<TopologyDevice>,
}

#[derive(Debug, Deserialize)]
pub struct TopologyDevice {
    pub name: String,
    pub capacity_gb: u64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A loaded topology: the in-memory catalog plus name lookups.
pub struct Topology {
    pub cluster: MemoryCluster,
    pub cluster_id: ClusterId,
    /// Device ids by `node-name:device-name`.
    pub devices_by_name: BTreeMap<String, DeviceId>,
    /// Node display names by id, for output.
    pub node_names: BTreeMap<mason_types::NodeId, String>,
}

impl Topology {
    /// Load a topology file into an in-memory catalog.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: TopologyFile =
            toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

        let cluster_id = ClusterId::generate();
        let mut cluster = MemoryCluster::new();
        cluster.add_cluster(cluster_id);
        let mut devices_by_name = BTreeMap::new();
        let mut node_names = BTreeMap::new();

        for spec in file.nodes {
            let mut node = NodeEntry::new(cluster_id, spec.zone, spec.manage, spec.storage);
            node.tags = spec.tags;
            let node_id = node.id;
            node_names.insert(node_id, spec.name.clone());
            cluster.add_node(node);

            for dev_spec in spec.devices {
                let mut device = DeviceEntry::new(node_id, dev_spec.name.clone());
                device.set_capacity(dev_spec.capacity_gb * GB);
                device.tags = dev_spec.tags;
                devices_by_name.insert(format!("{}:{}", spec.name, dev_spec.name), device.id);
                cluster.add_device(device);
            }
        }

        Ok(Self {
            cluster,
            cluster_id,
            devices_by_name,
            node_names,
        })
    }
}
