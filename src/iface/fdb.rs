use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

use crate::phy::Endpoint;
use crate::wire::EthernetAddress;

/// The forwarding database of a learning switch: which UDP endpoint last
/// claimed each source address.
///
/// Bindings are learned from traffic and replaced unconditionally, so a
/// device that moves between endpoints is re-learned on its next frame.
/// Entries never age out and the table has no size cap.
///
/// Lookups during dispatch share the table; learning takes it exclusively.
/// Every operation is atomic on its own; the receive loop provides whatever
/// cross-operation ordering the switch needs by being single-threaded.
#[derive(Debug, Default)]
pub struct MacTable {
    entries: RwLock<HashMap<EthernetAddress, Endpoint>>,
}

impl MacTable {
    pub fn new() -> MacTable {
        MacTable::default()
    }

    /// Bind `mac` to `endpoint`, replacing any previous binding.
    ///
    /// Returns whether the key is new; the caller uses this to decide
    /// whether the binding deserves a "learned" record. Unaddressable
    /// endpoints are rejected outright so that every stored entry can be
    /// forwarded to.
    pub fn insert(&self, mac: EthernetAddress, endpoint: Endpoint) -> bool {
        if !endpoint.is_valid() {
            debug!("fdb: rejected {} -> {}", mac, endpoint);
            return false;
        }
        let mut entries = self.entries.write().unwrap();
        entries.insert(mac, endpoint).is_none()
    }

    /// The endpoint bound to `mac`, if any.
    pub fn lookup(&self, mac: &EthernetAddress) -> Option<Endpoint> {
        let entries = self.entries.read().unwrap();
        entries.get(mac).cloned()
    }

    pub fn contains(&self, mac: &EthernetAddress) -> bool {
        let entries = self.entries.read().unwrap();
        entries.contains_key(mac)
    }

    /// Drop the binding for `mac`, reporting whether one existed.
    pub fn remove(&self, mac: &EthernetAddress) -> bool {
        let mut entries = self.entries.write().unwrap();
        entries.remove(mac).is_some()
    }

    /// Every known endpoint, in no particular order.
    pub fn all_endpoints(&self) -> Vec<Endpoint> {
        let entries = self.entries.read().unwrap();
        entries.values().cloned().collect()
    }

    /// Every known endpoint except the one bound to `exclude`, if any.
    /// This is the flood set for a broadcast sourced by `exclude`.
    pub fn all_endpoints_except(&self, exclude: &EthernetAddress) -> Vec<Endpoint> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|(mac, _)| *mac != exclude)
            .map(|(_, endpoint)| endpoint.clone())
            .collect()
    }

    /// Every learned address, in no particular order.
    pub fn macs(&self) -> Vec<EthernetAddress> {
        let entries = self.entries.read().unwrap();
        entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        let entries = self.entries.read().unwrap();
        entries.is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
    }

    /// A copy of the whole table, detached from the lock.
    pub fn snapshot(&self) -> HashMap<EthernetAddress, Endpoint> {
        let entries = self.entries.read().unwrap();
        entries.clone()
    }
}
