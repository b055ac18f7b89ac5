//! # World Instance
//!
//! Composes the registry, spatial index, section map, buffer cache and
//! physics queue into the public voxel store.
//!
//! ## Ownership
//!
//! The world belongs to one thread, the owner. Every mutation - voxel
//! writes, commits, queue drains - happens there. Worker tasks never see
//! the world; they receive value-owned volumes and byte buffers.
//!
//! ## Two Write Paths
//!
//! `set_voxel` is the hot path: it accumulates into attached chunk buffers
//! and touches the scene only to attach on a miss. `set_voxel_direct`
//! bypasses the cache for low-frequency writes; it forces a full commit
//! first so a pending buffered write can never be overwritten by the older
//! in-node snapshot it is about to read.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use stratum_core::{Event, EventBus, NodeId, Replicate, SceneHandle};

use crate::codec;
use crate::config::WorldConfig;
use crate::coords::{
    chunk_to_section, local_in_chunk, size_i32, voxel_to_chunk, SectionPos, VoxelPos,
};
use crate::mesh::{build_physics_boxes, encode_physics_boxes, PHYSICS_BOXES_KEY};
use crate::physics_queue::PhysicsUpdateQueue;
use crate::section::{Section, VOXEL_DATA_KEY};
use crate::volume::{Region, VoxelVolume};
use crate::voxel::{VoxelInstance, VoxelRegistry};

/// The server-side voxel world.
pub struct World {
    config: WorldConfig,
    registry: Arc<VoxelRegistry>,
    scene: SceneHandle,
    sections: HashMap<SectionPos, Section>,
    /// Cache of recently used sections (push back, drop front).
    last_used_sections: VecDeque<SectionPos>,
    /// Sections with any attached buffer, sorted descending.
    sections_with_loaded_buffers: Vec<SectionPos>,
    physics_queue: PhysicsUpdateQueue,
}

impl World {
    /// Creates a world over the given scene.
    #[must_use]
    pub fn new(config: WorldConfig, registry: Arc<VoxelRegistry>, scene: SceneHandle) -> Self {
        Self {
            config,
            registry,
            scene,
            sections: HashMap::new(),
            last_used_sections: VecDeque::new(),
            sections_with_loaded_buffers: Vec::new(),
            physics_queue: PhysicsUpdateQueue::new(),
        }
    }

    /// The world's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The voxel registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<VoxelRegistry> {
        &self.registry
    }

    /// The scene handle all node access goes through.
    #[inline]
    #[must_use]
    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// Whether a section exists at `section_p`.
    #[must_use]
    pub fn has_section(&self, section_p: SectionPos) -> bool {
        self.sections.contains_key(&section_p)
    }

    /// Read-only access to a section, bypassing the recently-used cache.
    #[must_use]
    pub fn section(&self, section_p: SectionPos) -> Option<&Section> {
        self.sections.get(&section_p)
    }

    /// Number of sections currently holding attached buffers.
    #[must_use]
    pub fn num_buffers_loaded(&self) -> usize {
        self.sections_with_loaded_buffers.len()
    }

    /// The sections currently holding attached buffers, ordered
    /// descending.
    #[must_use]
    pub fn loaded_sections(&self) -> &[SectionPos] {
        &self.sections_with_loaded_buffers
    }

    /// The pending physics updates.
    #[must_use]
    pub fn physics_queue(&self) -> &PhysicsUpdateQueue {
        &self.physics_queue
    }

    /// Voxel region covered by a section: pure coordinate arithmetic.
    #[must_use]
    pub fn get_section_region_voxels(&self, section_p: SectionPos) -> Region {
        let cs = size_i32(self.config.chunk_size_voxels);
        let ss = size_i32(self.config.section_size_chunks);
        let p0 = [
            i32::from(section_p.x) * ss[0] * cs[0],
            i32::from(section_p.y) * ss[1] * cs[1],
            i32::from(section_p.z) * ss[2] * cs[2],
        ];
        Region::from_corners(
            p0[0],
            p0[1],
            p0[2],
            p0[0] + ss[0] * cs[0] - 1,
            p0[1] + ss[1] * cs[1] - 1,
            p0[2] + ss[2] * cs[2] - 1,
        )
    }

    /// Ensures a section exists, has scene nodes, and has generated
    /// content requested. Idempotent; the generation request is emitted
    /// once.
    pub fn load_or_generate_section(&mut self, section_p: SectionPos, bus: &mut EventBus) {
        let chunk_size = self.config.chunk_size_voxels;
        let section_size = self.config.section_size_chunks;
        let scene = self.scene.clone();
        let section = self
            .sections
            .entry(section_p)
            .or_insert_with(|| Section::new(section_p, chunk_size, section_size));

        if !section.loaded {
            section.loaded = true;
            debug!(?section_p, "loading section");
            create_section_nodes(section, &scene);
        }
        if !section.generated {
            section.generated = true;
            debug!(?section_p, "requesting generation for section");
            bus.emit(Event::GenerationRequest {
                section_p: section_p.to_array(),
            });
        }
    }

    /// Buffered voxel write. Attaches the chunk's buffer on first touch
    /// and marks it dirty; the scene sees nothing until the next commit.
    pub fn set_voxel(&mut self, p: VoxelPos, v: VoxelInstance, silent: bool) {
        // Too busy a place for even ignored log calls.
        let chunk_size = self.config.chunk_size_voxels;
        let chunk_p = voxel_to_chunk(p, chunk_size);
        let Some(section_p) = chunk_to_section(chunk_p, self.config.section_size_chunks) else {
            if !silent {
                warn!(?p, v = v.data, "voxel position outside section range");
            }
            return;
        };
        if !self.touch_section(section_p) {
            if !silent {
                warn!(?p, v = v.data, ?section_p, ?chunk_p, "no section for chunk");
            }
            return;
        }
        let local = local_in_chunk(p, chunk_p, chunk_size);
        let scene = self.scene.clone();
        let Some(section) = self.sections.get_mut(&section_p) else {
            return;
        };
        let buffer = section.get_buffer(chunk_p, &scene, silent);
        let Some(volume) = buffer.volume_mut() else {
            if !silent {
                warn!(?p, v = v.data, ?chunk_p, ?section_p, "couldn't get buffer volume for chunk");
            }
            return;
        };
        volume.set(local, v);
        buffer.dirty = true;
        self.insert_loaded(section_p);
    }

    /// Buffered voxel read. Attaches the chunk's buffer if needed; returns
    /// the undefined instance on any miss.
    pub fn get_voxel(&mut self, p: VoxelPos, silent: bool) -> VoxelInstance {
        let chunk_size = self.config.chunk_size_voxels;
        let chunk_p = voxel_to_chunk(p, chunk_size);
        let Some(section_p) = chunk_to_section(chunk_p, self.config.section_size_chunks) else {
            if !silent {
                warn!(?p, "voxel position outside section range");
            }
            return VoxelInstance::UNDEFINED;
        };
        if !self.touch_section(section_p) {
            if !silent {
                warn!(?p, ?section_p, ?chunk_p, "no section for chunk");
            }
            return VoxelInstance::UNDEFINED;
        }
        let local = local_in_chunk(p, chunk_p, chunk_size);
        let scene = self.scene.clone();
        let Some(section) = self.sections.get_mut(&section_p) else {
            return VoxelInstance::UNDEFINED;
        };
        let buffer = section.get_buffer(chunk_p, &scene, silent);
        let Some(volume) = buffer.volume() else {
            if !silent {
                warn!(?p, ?chunk_p, ?section_p, "couldn't get buffer volume for chunk");
            }
            return VoxelInstance::UNDEFINED;
        };
        let v = volume.get(local);
        self.insert_loaded(section_p);
        v
    }

    /// Write-through voxel write for low-frequency callers.
    ///
    /// Commits all pending buffers first, then decodes, mutates and
    /// re-encodes the node's blob in place under the scene gate.
    pub fn set_voxel_direct(&mut self, p: VoxelPos, v: VoxelInstance, replicate: &mut Replicate) {
        trace!(?p, v = v.data, "direct voxel write");
        let chunk_size = self.config.chunk_size_voxels;
        let chunk_p = voxel_to_chunk(p, chunk_size);
        let Some(section_p) = chunk_to_section(chunk_p, self.config.section_size_chunks) else {
            warn!(?p, v = v.data, "voxel position outside section range");
            return;
        };
        if !self.touch_section(section_p) {
            warn!(?p, v = v.data, ?section_p, ?chunk_p, "no section for chunk");
            return;
        }
        let node_id = match self.sections.get(&section_p) {
            Some(section) => section.node_id_at(chunk_p),
            None => return,
        };
        if node_id == 0 {
            warn!(?p, v = v.data, ?chunk_p, ?section_p, "no node for chunk");
            return;
        }

        // Commit first so this write can't be overwritten by an older
        // buffered snapshot at the next flush.
        self.commit(replicate);

        let local = local_in_chunk(p, chunk_p, chunk_size);
        let mut written: Option<Arc<VoxelVolume>> = None;
        self.scene.access(|store| {
            let Some(node) = store.get_mut(node_id) else {
                warn!(node_id, "direct write: node not found");
                return;
            };
            let Some(blob) = node.var(VOXEL_DATA_KEY) else {
                warn!(node_id, "direct write: node has no voxel data");
                return;
            };
            match codec::decode(blob) {
                Ok(mut volume) => {
                    volume.set(local, v);
                    node.set_var(VOXEL_DATA_KEY, codec::encode_compressed(&volume));
                    written = Some(Arc::new(volume));
                }
                Err(err) => {
                    warn!(node_id, error = %err, "direct write: undecodable blob");
                }
            }
        });
        if let Some(volume) = written {
            self.physics_queue.mark(node_id, volume);
        }
    }

    /// Flushes every dirty buffer to its node, schedules the replication
    /// follow-up events and physics rebuilds, and detaches all buffers.
    pub fn commit(&mut self, replicate: &mut Replicate) {
        if self.sections_with_loaded_buffers.is_empty() {
            return;
        }
        debug!(
            sections = self.sections_with_loaded_buffers.len(),
            "committing sections with loaded buffers"
        );
        let list = std::mem::take(&mut self.sections_with_loaded_buffers);
        for section_p in list {
            let Some(section) = self.sections.get_mut(&section_p) else {
                continue;
            };
            for chunk_i in 0..section.chunk_count() {
                commit_chunk_buffer(
                    section,
                    chunk_i,
                    &self.scene,
                    &mut self.physics_queue,
                    replicate,
                );
            }
        }
    }

    /// Queues a collision-box rebuild for a node.
    pub fn mark_node_for_physics_update(&mut self, node_id: NodeId, volume: Arc<VoxelVolume>) {
        self.physics_queue.mark(node_id, volume);
    }

    /// Drains the physics queue: every queued node gets its collision
    /// boxes rebuilt from the queued volume. Absent nodes are logged and
    /// skipped.
    pub fn run_physics_updates(&mut self) {
        if self.physics_queue.is_empty() {
            return;
        }
        debug!(count = self.physics_queue.len(), "running node physics updates");
        let updates = self.physics_queue.take();
        let registry = Arc::clone(&self.registry);
        self.scene.access(|store| {
            for update in updates {
                let Some(node) = store.get_mut(update.node_id) else {
                    warn!(node_id = update.node_id, "physics update: node not found");
                    continue;
                };
                let boxes = build_physics_boxes(&update.volume, &registry);
                node.set_var(PHYSICS_BOXES_KEY, encode_physics_boxes(&boxes));
            }
        });
    }

    /// Commits, then removes every chunk node this world created.
    pub fn unload(&mut self, replicate: &mut Replicate) {
        debug!("unloading voxel world");
        self.commit(replicate);
        let scene = self.scene.clone();
        scene.access(|store| {
            for section in self.sections.values_mut() {
                for chunk_i in 0..section.chunk_count() {
                    let chunk_p = section.chunk_pos(chunk_i);
                    let node_id = section.node_id_at(chunk_p);
                    section.set_node_id(chunk_p, 0);
                    if node_id != 0 {
                        trace!(node_id, "unloading node");
                        store.remove(node_id);
                    }
                }
            }
        });
    }

    /// Looks a section up through the recently-used cache; returns whether
    /// it exists. A hit keeps the cache untouched, a miss that finds the
    /// section in the map pushes it in and evicts the oldest entry.
    fn touch_section(&mut self, section_p: SectionPos) -> bool {
        if self.last_used_sections.contains(&section_p) {
            return true;
        }
        if !self.sections.contains_key(&section_p) {
            return false;
        }
        self.last_used_sections.push_back(section_p);
        while self.last_used_sections.len() > self.config.section_cache_size {
            self.last_used_sections.pop_front();
        }
        true
    }

    /// Ordered, deduplicated insert into the loaded-buffers list.
    fn insert_loaded(&mut self, section_p: SectionPos) {
        let at = self
            .sections_with_loaded_buffers
            .partition_point(|s| *s > section_p);
        match self.sections_with_loaded_buffers.get(at) {
            Some(existing) if *existing == section_p => {}
            _ => self.sections_with_loaded_buffers.insert(at, section_p),
        }
    }
}

/// Creates one scene node per chunk of the section, each initialized with
/// an all-empty padded volume blob.
fn create_section_nodes(section: &mut Section, scene: &SceneHandle) {
    let empty_blob = codec::encode_compressed(&VoxelVolume::new(section.padded_chunk_region()));
    let section_p = section.section_p();
    let lower = section.contained_chunks().lower();
    scene.access(|store| {
        for chunk_i in 0..section.chunk_count() {
            let chunk_p = section.chunk_pos(chunk_i);
            let name = format!(
                "static_({},{},{})_({},{},{})",
                section_p.x,
                section_p.y,
                section_p.z,
                chunk_p.x - lower[0],
                chunk_p.y - lower[1],
                chunk_p.z - lower[2],
            );
            let node_id = store.create_child(&name);
            store.set_var(node_id, VOXEL_DATA_KEY, empty_blob.clone());
            section.set_node_id(chunk_p, node_id);
        }
    });
}

/// Commits one chunk buffer: clean buffers are just detached, dirty ones
/// are serialized to their node first. Either way the buffer ends
/// detached.
fn commit_chunk_buffer(
    section: &mut Section,
    chunk_i: usize,
    scene: &SceneHandle,
    physics_queue: &mut PhysicsUpdateQueue,
    replicate: &mut Replicate,
) {
    let chunk_p = section.chunk_pos(chunk_i);
    let node_id = section.node_id_at(chunk_p);
    let section_p = section.section_p();

    let buffer = section.buffer_at(chunk_i);
    if !buffer.is_attached() {
        return;
    }
    if !buffer.dirty {
        // Read-only buffer: just unload the volume.
        buffer.detach();
        return;
    }
    if node_id == 0 {
        warn!(chunk_i, ?chunk_p, ?section_p, "commit: no node found for chunk");
        buffer.detach();
        return;
    }

    let (blob, shared) = match buffer.volume() {
        Some(volume) => (codec::encode_compressed(volume), Arc::clone(volume)),
        None => return,
    };

    let wrote = scene.access(|store| {
        let Some(node) = store.get_mut(node_id) else {
            warn!(node_id, "commit: node not found");
            return false;
        };
        if node.var(VOXEL_DATA_KEY).is_none() {
            warn!(node_id, "commit: node has no existing voxel data; assuming an error");
            return false;
        }
        node.set_var(VOXEL_DATA_KEY, blob);
        true
    });

    if wrote {
        // Listeners of this event may assume the bytes have replicated, so
        // it fires only after the next replication pass.
        replicate.emit_after_next_sync(Event::NodeVoxelDataUpdated { node_id });
        physics_queue.mark(node_id, shared);
    }
    section.buffer_at(chunk_i).detach();
}
