//! Port/channel -> track routing table (§4.8: "Routing tables are mutated
//! only from the control plane and read from the RT thread via atomically
//! swappable snapshots").

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use sushi_core::rt_event::TrackId;

pub type PortId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortChannel {
    pub port: PortId,
    pub channel: u8,
}

/// An immutable snapshot of the port+channel -> track map. Replaced wholesale
/// on every control-plane mutation; the RT thread only ever holds a cloned
/// `Arc` to one snapshot for the duration of a chunk, so a concurrent
/// mutation never tears a read.
#[derive(Debug, Default, Clone)]
pub struct RoutingSnapshot {
    by_channel: HashMap<PortChannel, TrackId>,
}

impl RoutingSnapshot {
    pub fn track_for(&self, port: PortId, channel: u8) -> Option<TrackId> {
        self.by_channel.get(&PortChannel { port, channel }).copied()
    }
}

pub struct RoutingTable {
    snapshot: ArcSwap<RoutingSnapshot>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RoutingSnapshot::default()),
        }
    }

    /// RT-safe read: load the current snapshot without blocking.
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.load_full()
    }

    /// Control-plane only: route `port`/`channel` to `track`.
    pub fn connect(&self, port: PortId, channel: u8, track: TrackId) {
        let mut next = (**self.snapshot.load()).clone();
        next.by_channel.insert(PortChannel { port, channel }, track);
        self.snapshot.store(Arc::new(next));
    }

    /// Control-plane only: remove a routing entry, if present.
    pub fn disconnect(&self, port: PortId, channel: u8) {
        let mut next = (**self.snapshot.load()).clone();
        next.by_channel.remove(&PortChannel { port, channel });
        self.snapshot.store(Arc::new(next));
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_connected_port_channel() {
        let table = RoutingTable::new();
        table.connect(0, 0, 5);
        assert_eq!(table.snapshot().track_for(0, 0), Some(5));
        assert_eq!(table.snapshot().track_for(0, 1), None);
    }

    #[test]
    fn disconnect_removes_mapping() {
        let table = RoutingTable::new();
        table.connect(0, 0, 5);
        table.disconnect(0, 0);
        assert_eq!(table.snapshot().track_for(0, 0), None);
    }

    #[test]
    fn snapshot_taken_before_mutation_is_unaffected() {
        let table = RoutingTable::new();
        table.connect(0, 0, 5);
        let held = table.snapshot();
        table.connect(0, 0, 9);
        assert_eq!(held.track_for(0, 0), Some(5));
        assert_eq!(table.snapshot().track_for(0, 0), Some(9));
    }
}
