//! # Physics Update Queue
//!
//! Nodes whose collision boxes need rebuilding, de-duplicated and kept
//! sorted by node id in descending order. Re-marking a queued node
//! replaces its volume pointer, so a node is rebuilt at most once per
//! drain no matter how many commits touched it.

use std::sync::Arc;

use stratum_core::NodeId;

use crate::volume::VoxelVolume;

/// One pending collision-box rebuild.
#[derive(Clone, Debug)]
pub struct QueuedNodePhysicsUpdate {
    /// The node to rebuild.
    pub node_id: NodeId,
    /// The volume snapshot to rebuild from.
    pub volume: Arc<VoxelVolume>,
}

/// De-duplicated queue ordered by node id descending.
#[derive(Debug, Default)]
pub struct PhysicsUpdateQueue {
    entries: Vec<QueuedNodePhysicsUpdate>,
}

impl PhysicsUpdateQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a rebuild for `node_id`, coalescing with an existing entry.
    pub fn mark(&mut self, node_id: NodeId, volume: Arc<VoxelVolume>) {
        // Lower bound within the descending order.
        let at = self.entries.partition_point(|e| e.node_id > node_id);
        match self.entries.get_mut(at) {
            Some(entry) if entry.node_id == node_id => entry.volume = volume,
            _ => self
                .entries
                .insert(at, QueuedNodePhysicsUpdate { node_id, volume }),
        }
    }

    /// Takes every queued entry, leaving the queue empty.
    #[must_use]
    pub fn take(&mut self) -> Vec<QueuedNodePhysicsUpdate> {
        std::mem::take(&mut self.entries)
    }

    /// Whether `node_id` is queued.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.entries
            .binary_search_by(|e| node_id.cmp(&e.node_id))
            .is_ok()
    }

    /// Number of queued entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The queued entries, ordered by node id descending.
    #[must_use]
    pub fn entries(&self) -> &[QueuedNodePhysicsUpdate] {
        &self.entries
    }
}
