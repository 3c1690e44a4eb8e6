//! Shared types and identifiers for mason.
//!
//! This crate defines the data model the allocator operates on:
//! identifiers ([`DeviceId`], [`NodeId`], [`BrickId`], [`VolumeId`],
//! [`ClusterId`]), the persistent-entry records ([`DeviceEntry`],
//! [`NodeEntry`], [`BrickEntry`], [`VolumeEntry`]), lifecycle states
//! ([`EntryState`]) and the capacity/space model ([`Storage`],
//! [`BrickSpace`]).
//!
//! Entries are owned by an external persistence layer; mason works on
//! in-memory copies and hands mutated copies back to the caller to
//! persist. Everything here is therefore plain data: no I/O, no async.

use std::fmt;

use serde::{Deserialize, Serialize};

mod brick;
mod device;
mod node;
mod volume;

pub use brick::{brick_path, BrickEntry, BrickSubType};
pub use device::{BrickSpace, DeviceEntry, Storage};
pub use node::NodeEntry;
pub use volume::{
    DurabilityConfig, VolumeEntry, DEFAULT_AVERAGE_FILE_SIZE, DEFAULT_SNAPSHOT_FACTOR,
};

// ---------------------------------------------------------------------------
// Size units
// ---------------------------------------------------------------------------

// All sizes in this crate are expressed in KiB, the allocation unit of
// the underlying volume manager.

/// One KiB, the base unit.
pub const KB: u64 = 1;
/// One MiB in KiB.
pub const MB: u64 = KB * 1024;
/// One GiB in KiB.
pub const GB: u64 = MB * 1024;
/// One TiB in KiB.
pub const TB: u64 = GB * 1024;

/// Default extent size of a device: 4 MiB, the volume-manager default.
/// All brick allocations are rounded up to this granularity.
pub const DEFAULT_EXTENT_SIZE: u64 = 4 * MB;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 16]);

        impl $name {
            /// Create a fresh random ID.
            pub fn generate() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; 16];
                rand::rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Return the raw 16-byte representation.
            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Fold the ID into a `u64`, for seeding.
            pub fn to_seed(&self) -> u64 {
                let bytes: [u8; 8] = self.0[..8].try_into().expect("8 bytes");
                u64::from_le_bytes(bytes)
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

define_id!(
    /// Identifier for a storage device on a node.
    DeviceId
);

define_id!(
    /// Identifier for a management/storage host.
    NodeId
);

define_id!(
    /// Identifier for a single brick allocation.
    BrickId
);

define_id!(
    /// Identifier for a logical volume.
    VolumeId
);

define_id!(
    /// Identifier for a cluster of nodes.
    ClusterId
);

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Lifecycle state of a node or device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Eligible for placement.
    Online,
    /// Administratively removed from placement, still holding data.
    Offline,
    /// Permanently out of service; must be empty.
    Failed,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryState::Online => "online",
            EntryState::Offline => "offline",
            EntryState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Errors raised by entry state transitions and bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// The requested lifecycle transition is not allowed.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: EntryState,
        /// Requested state.
        to: EntryState,
    },

    /// A device may only be failed once it hosts no bricks.
    #[error("device {0} still hosts bricks")]
    DeviceNotEmpty(DeviceId),
}

// ---------------------------------------------------------------------------
// Placement descriptors
// ---------------------------------------------------------------------------

/// An ephemeral device/node pairing handed out by a device source.
///
/// Carries just the identifiers a placement pass needs up front, so the
/// placer does not have to re-resolve the owning node (or its zone) for
/// every candidate it considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAndNode {
    /// The candidate device.
    pub device: DeviceId,
    /// The node the device is attached to.
    pub node: NodeId,
    /// The failure zone of that node.
    pub zone: u32,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Tag key marking a node or device's arbiter capability.
pub const ARBITER_TAG: &str = "arbiter";

/// Arbiter capability derived from node/device tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbiterTag {
    /// May host either data or arbiter bricks (the untagged default).
    #[default]
    Supported,
    /// Hosts only arbiter bricks.
    Required,
    /// Never hosts arbiter bricks.
    Disabled,
}

impl ArbiterTag {
    /// Parse a tag value. Unknown values fall back to the default.
    pub fn parse(value: &str) -> Self {
        match value {
            "required" => ArbiterTag::Required,
            "disabled" => ArbiterTag::Disabled,
            _ => ArbiterTag::Supported,
        }
    }
}
