//! # Peer Outbox
//!
//! The send half of the network collaborator as the voxel world sees it:
//! `send(peer, name, payload)`. Frames accumulate per peer; the transport
//! that is out of scope here drains them with [`Outbox::take_frames`].
//!
//! Name registration frames are interleaved automatically: the first send
//! of a given packet name is preceded by its type-0 announcement.

use std::collections::HashMap;

use tracing::trace;

use crate::frame::{Frame, PacketNameRegistry};

/// Peer identifier, mirroring `stratum_core::PeerId`.
pub type PeerId = u32;

/// Per-peer queue of outgoing frames with shared name registration.
///
/// The registry is per-outbox rather than per-peer: every peer of one
/// server shares one name table, and each peer receives each registration
/// announcement once, before the first data frame that uses it.
#[derive(Debug, Default)]
pub struct Outbox {
    registry: PacketNameRegistry,
    queues: HashMap<PeerId, Vec<Frame>>,
    announced: HashMap<PeerId, Vec<u16>>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a named packet to `peer`.
    pub fn send(&mut self, peer: PeerId, name: &str, payload: Vec<u8>) {
        let (frame_type, registration) = self.registry.register(name);
        let queue = self.queues.entry(peer).or_default();
        let announced = self.announced.entry(peer).or_default();

        if let Some(reg) = registration {
            queue.push(reg);
            announced.push(frame_type);
        } else if !announced.contains(&frame_type) {
            // Name was registered through an earlier peer; this peer still
            // needs the announcement once.
            if let Some(reg) = self.registry.registration_frame(name) {
                queue.push(reg);
                announced.push(frame_type);
            }
        }

        trace!(peer, name, frame_type, bytes = payload.len(), "queueing packet");
        queue.push(Frame {
            frame_type,
            payload,
        });
    }

    /// Drains all frames queued for `peer`.
    #[must_use]
    pub fn take_frames(&mut self, peer: PeerId) -> Vec<Frame> {
        self.queues.remove(&peer).unwrap_or_default()
    }

    /// Number of frames pending for `peer`.
    #[must_use]
    pub fn pending(&self, peer: PeerId) -> usize {
        self.queues.get(&peer).map_or(0, Vec::len)
    }

    /// Peers that currently have pending frames.
    #[must_use]
    pub fn peers_with_pending(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(p, _)| *p)
            .collect();
        peers.sort_unstable();
        peers
    }
}
