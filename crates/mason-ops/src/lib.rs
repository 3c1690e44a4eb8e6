//! Cluster operations for mason.
//!
//! Long-running workflows that combine placement with remote execution.
//! The crate provides the [`BrickExecutor`] seam to the storage hosts,
//! the [`IntentLog`] seam for crash-visible operation claims, the
//! [`ControlStore`] seam for persistence, and the [`DeviceRemoval`]
//! workflow that drains a device brick by brick.
//!
//! All workflows are remote-first: the store only learns about a change
//! after the storage hosts have accepted it, so a failure partway never
//! leaves the catalog describing bricks that do not exist.

mod error;
mod executor;
mod intent;
mod remove;
mod store;

pub use error::{ExecutorError, OpError};
pub use executor::{BrickExecutor, BrickHealth, BrickRequest, RemoteBrick, RemoteVolume};
pub use intent::{IntentLog, MemoryIntentLog};
pub use remove::{DeviceRemoval, RemovalPhase};
pub use store::ControlStore;
