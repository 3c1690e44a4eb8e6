//! Durable operation intents.
//!
//! Before a removal mutates anything it records its intent, so a crash
//! mid-operation is visible on restart and a second operation on the
//! same device is refused. The trait is the persistence seam; the
//! in-memory implementation backs the daemon's dry runs and tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use mason_types::DeviceId;

use crate::error::OpError;

/// Records which devices have a removal in flight.
#[async_trait]
pub trait IntentLog: Send + Sync {
    /// Claim a device for removal. Fails with [`OpError::Conflict`]
    /// when a removal is already pending for it.
    async fn begin_remove(&self, device: DeviceId) -> Result<(), OpError>;

    /// Release the claim, whether the removal committed or rolled back.
    async fn finish_remove(&self, device: DeviceId) -> Result<(), OpError>;

    /// Whether a removal is pending for the device.
    async fn is_pending(&self, device: DeviceId) -> bool;
}

/// In-memory intent log.
#[derive(Debug, Default)]
pub struct MemoryIntentLog {
    pending: Mutex<HashSet<DeviceId>>,
}

impl MemoryIntentLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentLog for MemoryIntentLog {
    async fn begin_remove(&self, device: DeviceId) -> Result<(), OpError> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if !pending.insert(device) {
            return Err(OpError::Conflict);
        }
        Ok(())
    }

    async fn finish_remove(&self, device: DeviceId) -> Result<(), OpError> {
        self.pending.lock().expect("lock poisoned").remove(&device);
        Ok(())
    }

    async fn is_pending(&self, device: DeviceId) -> bool {
        self.pending.lock().expect("lock poisoned").contains(&device)
    }
}
