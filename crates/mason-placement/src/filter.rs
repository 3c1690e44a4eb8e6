//! Device filters.
//!
//! A filter is a synchronous predicate consulted for every ring
//! candidate, in the context of the set being built. Filters compose by
//! conjunction: wrap two filters in a closure that requires both.

use std::collections::HashMap;

use mason_types::{DeviceEntry, DeviceId};

use crate::error::SourceError;
use crate::set::BrickSet;
use crate::source::DeviceSource;

/// A placement predicate: may this device host the next brick of this
/// (possibly partially filled) set?
pub type DeviceFilter<'a> = &'a (dyn Fn(&BrickSet, &DeviceEntry) -> bool + Send + Sync);

/// Spreads the bricks of a set across failure zones.
///
/// Built once per pass from the source's candidate list, so lookups
/// during placement are synchronous. A candidate is rejected when any
/// already-placed brick in the set sits in the candidate's zone.
#[derive(Debug, Clone)]
pub struct ZoneFilter {
    zones: HashMap<DeviceId, u32>,
}

impl ZoneFilter {
    /// Snapshot device-to-zone mappings for the current candidates.
    pub async fn build(source: &mut dyn DeviceSource) -> Result<Self, SourceError> {
        let mut zones = HashMap::new();
        for dan in source.devices().await? {
            zones.insert(dan.device, dan.zone);
        }
        Ok(Self { zones })
    }

    pub fn allows(&self, set: &BrickSet, candidate: &DeviceEntry) -> bool {
        let Some(&zone) = self.zones.get(&candidate.id) else {
            // Not in the snapshot this filter was built from.
            return false;
        };
        !set.bricks()
            .any(|b| self.zones.get(&b.device_id) == Some(&zone))
    }

    /// The filter as a closure, for handing to a placer.
    pub fn as_filter(&self) -> impl Fn(&BrickSet, &DeviceEntry) -> bool + Send + Sync + '_ {
        move |set, device| self.allows(set, device)
    }
}
