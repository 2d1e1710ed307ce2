//! Switch registry lookups.
//!
//! Rate-limit operations are only forwarded for switches the controller
//! knows about. The registry is fed by switch add/delete events.

use nbapi_types::DatapathId;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

/// Answers whether a switch is currently known to the controller.
pub trait SwitchRegistry: Send + Sync {
    fn switch_known(&self, dpid: DatapathId) -> bool;
}

impl<F> SwitchRegistry for F
where
    F: Fn(DatapathId) -> bool + Send + Sync,
{
    fn switch_known(&self, dpid: DatapathId) -> bool {
        self(dpid)
    }
}

/// Concurrent set of switches that are currently connected.
#[derive(Debug, Default)]
pub struct KnownSwitches {
    switches: RwLock<HashSet<DatapathId>>,
}

impl KnownSwitches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a switch joining. Returns false if it was already known.
    pub fn switch_added(&self, dpid: DatapathId) -> bool {
        let added = self.switches.write().insert(dpid);
        debug!(dpid = %dpid, added, "Switch added");
        added
    }

    /// Records a switch leaving. Returns false if it was not known.
    pub fn switch_removed(&self, dpid: DatapathId) -> bool {
        let removed = self.switches.write().remove(&dpid);
        debug!(dpid = %dpid, removed, "Switch removed");
        removed
    }

    pub fn len(&self) -> usize {
        self.switches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.read().is_empty()
    }

    /// Known switches in ascending id order.
    pub fn snapshot(&self) -> Vec<DatapathId> {
        let mut ids: Vec<_> = self.switches.read().iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FromIterator<DatapathId> for KnownSwitches {
    fn from_iter<I: IntoIterator<Item = DatapathId>>(iter: I) -> Self {
        Self {
            switches: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl SwitchRegistry for KnownSwitches {
    fn switch_known(&self, dpid: DatapathId) -> bool {
        self.switches.read().contains(&dpid)
    }
}
