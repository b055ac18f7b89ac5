//! # Replication Facade
//!
//! The replication subsystem proper (scene snapshots to clients) lives
//! outside this core. What the voxel world needs from it is narrow:
//!
//! - defer an event until after the next replication pass, so listeners can
//!   assume the bytes it refers to have already reached clients
//! - ask which peers have a given node replicated
//!
//! Both are served by this in-memory facade; the real transport feeds the
//! knowledge table through [`Replicate::mark_node_known_by`].

use std::collections::HashMap;

use tracing::debug;

use crate::events::{Event, EventBus};
use crate::scene::NodeId;

/// Identifier of a connected peer.
pub type PeerId = u32;

/// Deferred-event and peer-knowledge bookkeeping.
#[derive(Debug, Default)]
pub struct Replicate {
    deferred: Vec<Event>,
    known_by: HashMap<NodeId, Vec<PeerId>>,
}

impl Replicate {
    /// Creates an empty facade.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `event` for emission after the next replication pass.
    pub fn emit_after_next_sync(&mut self, event: Event) {
        self.deferred.push(event);
    }

    /// Completes a replication pass: every deferred event is moved onto the
    /// bus in the order it was queued.
    pub fn sync(&mut self, bus: &mut EventBus) {
        if !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "flushing post-sync events");
        }
        for event in self.deferred.drain(..) {
            bus.emit(event);
        }
    }

    /// Records that `peer` has `node_id` replicated.
    pub fn mark_node_known_by(&mut self, peer: PeerId, node_id: NodeId) {
        let peers = self.known_by.entry(node_id).or_default();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    /// Drops all knowledge records for `peer`.
    pub fn forget_peer(&mut self, peer: PeerId) {
        for peers in self.known_by.values_mut() {
            peers.retain(|p| *p != peer);
        }
    }

    /// Returns the peers that have `node_id` replicated.
    #[must_use]
    pub fn peers_knowing_node(&self, node_id: NodeId) -> Vec<PeerId> {
        self.known_by.get(&node_id).cloned().unwrap_or_default()
    }

    /// Number of events waiting for the next pass.
    #[inline]
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_events_flush_on_sync() {
        let mut replicate = Replicate::new();
        let mut bus = EventBus::new();

        replicate.emit_after_next_sync(Event::NodeVoxelDataUpdated { node_id: 7 });
        assert!(bus.is_empty());
        assert_eq!(replicate.deferred_len(), 1);

        replicate.sync(&mut bus);
        assert_eq!(replicate.deferred_len(), 0);
        assert!(matches!(
            bus.pop(),
            Some(Event::NodeVoxelDataUpdated { node_id: 7 })
        ));
    }

    #[test]
    fn test_peer_knowledge_dedup_and_forget() {
        let mut replicate = Replicate::new();
        replicate.mark_node_known_by(1, 10);
        replicate.mark_node_known_by(1, 10);
        replicate.mark_node_known_by(2, 10);
        assert_eq!(replicate.peers_knowing_node(10), vec![1, 2]);
        assert!(replicate.peers_knowing_node(11).is_empty());

        replicate.forget_peer(1);
        assert_eq!(replicate.peers_knowing_node(10), vec![2]);
    }
}
