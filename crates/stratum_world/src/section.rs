//! # Sections and the Chunk Buffer Cache
//!
//! A section is the unit of world loading: a fixed-size cuboid of chunks,
//! each backed by one scene node. Chunk contents are touched through a
//! write-back buffer: absent until first use, attached by decoding the
//! node's blob, detached (serializing first if dirty) at commit.

use std::sync::Arc;

use tracing::warn;

use stratum_core::{NodeId, SceneHandle};

use crate::codec;
use crate::coords::{section_origin_chunk, size_i32, ChunkPos, SectionPos};
use crate::volume::{Region, Volume, VoxelVolume};

/// Node variable carrying the serialized chunk blob.
pub const VOXEL_DATA_KEY: &str = "buildat_voxel_data";

/// Write-back buffer of one chunk.
///
/// `dirty == false` means the buffer has only been read from so far.
#[derive(Clone, Debug, Default)]
pub struct ChunkBuffer {
    volume: Option<Arc<VoxelVolume>>,
    /// Whether the buffer holds writes the node has not seen.
    pub dirty: bool,
}

impl ChunkBuffer {
    /// Whether a volume is attached.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.volume.is_some()
    }

    /// The attached volume, if any.
    #[inline]
    #[must_use]
    pub fn volume(&self) -> Option<&Arc<VoxelVolume>> {
        self.volume.as_ref()
    }

    /// Mutable access to the attached volume.
    ///
    /// Clones the underlying storage only if a physics update still shares
    /// it.
    #[inline]
    pub fn volume_mut(&mut self) -> Option<&mut VoxelVolume> {
        self.volume.as_mut().map(Arc::make_mut)
    }

    /// Attaches a decoded volume.
    pub fn attach(&mut self, volume: VoxelVolume) {
        self.volume = Some(Arc::new(volume));
    }

    /// Drops the volume and clears the dirty flag.
    pub fn detach(&mut self) {
        self.volume = None;
        self.dirty = false;
    }
}

/// A fixed-size cuboid of chunks plus their buffers and node ids.
#[derive(Debug)]
pub struct Section {
    section_p: SectionPos,
    chunk_size: [i16; 3],
    /// Position and size of the contained chunks, in chunk coordinates.
    contained_chunks: Region,
    /// Node id per global chunk coordinate; 0 = unassigned.
    node_ids: Volume<NodeId>,
    chunk_buffers: Vec<ChunkBuffer>,
    // Cached for indexing speed.
    w_chunks: i32,
    h_chunks: i32,
    /// Whether the section's nodes exist in the scene.
    pub loaded: bool,
    /// Whether generated content has been requested for the section.
    pub generated: bool,
    /// Declared but unused: disk persistence is not part of this core.
    pub save_enabled: bool,
}

impl Section {
    /// Creates a section covering the chunks of `section_p`.
    #[must_use]
    pub fn new(section_p: SectionPos, chunk_size: [i16; 3], section_size: [i16; 3]) -> Self {
        let origin = section_origin_chunk(section_p, section_size);
        let d = size_i32(section_size);
        let contained_chunks = Region::from_corners(
            origin.x,
            origin.y,
            origin.z,
            origin.x + d[0] - 1,
            origin.y + d[1] - 1,
            origin.z + d[2] - 1,
        );
        let num_chunks = contained_chunks.cell_count();
        Self {
            section_p,
            chunk_size,
            contained_chunks,
            node_ids: Volume::new(contained_chunks),
            chunk_buffers: vec![ChunkBuffer::default(); num_chunks],
            w_chunks: contained_chunks.width(),
            h_chunks: contained_chunks.height(),
            loaded: false,
            generated: false,
            save_enabled: false,
        }
    }

    /// The section's own coordinate.
    #[inline]
    #[must_use]
    pub const fn section_p(&self) -> SectionPos {
        self.section_p
    }

    /// The contained chunks, in chunk coordinates.
    #[inline]
    #[must_use]
    pub const fn contained_chunks(&self) -> Region {
        self.contained_chunks
    }

    /// Number of chunk slots.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunk_buffers.len()
    }

    /// Dense buffer index of a global chunk position.
    #[must_use]
    pub fn chunk_index(&self, chunk_p: ChunkPos) -> Option<usize> {
        if !self.contained_chunks.contains([chunk_p.x, chunk_p.y, chunk_p.z]) {
            return None;
        }
        let l = self.contained_chunks.lower();
        let lx = chunk_p.x - l[0];
        let ly = chunk_p.y - l[1];
        let lz = chunk_p.z - l[2];
        Some(((lz * self.h_chunks + ly) * self.w_chunks + lx) as usize)
    }

    /// Global chunk position of a dense buffer index.
    #[must_use]
    pub fn chunk_pos(&self, chunk_i: usize) -> ChunkPos {
        let i = chunk_i as i32;
        let w = self.w_chunks;
        let h = self.h_chunks;
        let lz = i / (h * w);
        let ly = i / w - lz * h;
        let lx = i - lz * h * w - ly * w;
        let l = self.contained_chunks.lower();
        ChunkPos::new(l[0] + lx, l[1] + ly, l[2] + lz)
    }

    /// Node id assigned to a global chunk position, 0 when unassigned.
    #[must_use]
    pub fn node_id_at(&self, chunk_p: ChunkPos) -> NodeId {
        self.node_ids.get([chunk_p.x, chunk_p.y, chunk_p.z])
    }

    /// Records the node id of a chunk.
    pub fn set_node_id(&mut self, chunk_p: ChunkPos, id: NodeId) {
        self.node_ids.set([chunk_p.x, chunk_p.y, chunk_p.z], id);
    }

    /// The padded content region of one chunk: one extra voxel on every
    /// side so meshing can read neighbor edges without cross-chunk locks.
    #[must_use]
    pub fn padded_chunk_region(&self) -> Region {
        let d = size_i32(self.chunk_size);
        Region::from_corners(-1, -1, -1, d[0], d[1], d[2])
    }

    /// Direct access to a buffer slot by dense index.
    #[inline]
    pub fn buffer_at(&mut self, chunk_i: usize) -> &mut ChunkBuffer {
        &mut self.chunk_buffers[chunk_i]
    }

    /// Whether any chunk buffer is attached.
    #[must_use]
    pub fn any_buffer_attached(&self) -> bool {
        self.chunk_buffers.iter().any(ChunkBuffer::is_attached)
    }

    /// The buffer of a chunk, attaching it from the scene on a miss.
    ///
    /// If the chunk has no node, or the node's blob is missing or
    /// malformed, a warning is logged (unless `silent`) and the returned
    /// buffer is left unattached; the caller treats that as a no-op.
    pub fn get_buffer(
        &mut self,
        chunk_p: ChunkPos,
        scene: &SceneHandle,
        silent: bool,
    ) -> &mut ChunkBuffer {
        let chunk_i = match self.chunk_index(chunk_p) {
            Some(i) => i,
            None => {
                // Callers resolve the section from the chunk coordinate, so
                // this means a coordinate bug, not bad data.
                unreachable!("chunk {chunk_p:?} outside section {:?}", self.section_p)
            }
        };
        if self.chunk_buffers[chunk_i].is_attached() {
            return &mut self.chunk_buffers[chunk_i];
        }

        let node_id = self.node_ids.get([chunk_p.x, chunk_p.y, chunk_p.z]);
        if node_id == 0 {
            if !silent {
                warn!(
                    ?chunk_p,
                    section = ?self.section_p,
                    "no node found for chunk"
                );
            }
            return &mut self.chunk_buffers[chunk_i];
        }

        let blob = scene.access(|scene| {
            let Some(node) = scene.get(node_id) else {
                if !silent {
                    warn!(node_id, ?chunk_p, "chunk node not found in scene");
                }
                return None;
            };
            node.var(VOXEL_DATA_KEY).map(<[u8]>::to_vec)
        });
        let Some(blob) = blob else {
            return &mut self.chunk_buffers[chunk_i];
        };

        match codec::decode(&blob) {
            Ok(volume) => self.chunk_buffers[chunk_i].attach(volume),
            Err(err) => {
                if !silent {
                    warn!(
                        node_id,
                        ?chunk_p,
                        error = %err,
                        "chunk blob could not be decoded; treating chunk as empty"
                    );
                }
            }
        }
        &mut self.chunk_buffers[chunk_i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::VoxelInstance;

    const CHUNK_SIZE: [i16; 3] = [8, 8, 8];
    const SECTION_SIZE: [i16; 3] = [2, 2, 2];

    #[test]
    fn test_contained_chunks_of_negative_section() {
        let section = Section::new(SectionPos::new(-1, -1, -1), CHUNK_SIZE, SECTION_SIZE);
        let region = section.contained_chunks();
        assert_eq!(region.lower(), [-2, -2, -2]);
        assert_eq!(region.upper(), [-1, -1, -1]);
        assert_eq!(section.chunk_count(), 8);
    }

    #[test]
    fn test_chunk_index_roundtrip() {
        let section = Section::new(SectionPos::new(1, 0, -1), CHUNK_SIZE, SECTION_SIZE);
        for i in 0..section.chunk_count() {
            let p = section.chunk_pos(i);
            assert_eq!(section.chunk_index(p), Some(i));
        }
        assert_eq!(section.chunk_index(ChunkPos::new(0, 0, 0)), None);
    }

    #[test]
    fn test_get_buffer_without_node_stays_unattached() {
        let mut section = Section::new(SectionPos::new(0, 0, 0), CHUNK_SIZE, SECTION_SIZE);
        let scene = SceneHandle::new();
        let buffer = section.get_buffer(ChunkPos::new(0, 0, 0), &scene, true);
        assert!(!buffer.is_attached());
        assert!(!buffer.dirty);
    }

    #[test]
    fn test_get_buffer_decodes_node_blob() {
        let mut section = Section::new(SectionPos::new(0, 0, 0), CHUNK_SIZE, SECTION_SIZE);
        let scene = SceneHandle::new();
        let chunk_p = ChunkPos::new(1, 0, 0);

        let mut volume = VoxelVolume::new(section.padded_chunk_region());
        volume.set([3, 3, 3], VoxelInstance::new(2));
        let node_id = scene.access(|s| {
            let id = s.create_child("chunk");
            s.get_mut(id)
                .unwrap()
                .set_var(VOXEL_DATA_KEY, codec::encode_compressed(&volume));
            id
        });
        section.set_node_id(chunk_p, node_id);

        let buffer = section.get_buffer(chunk_p, &scene, false);
        assert!(buffer.is_attached());
        assert_eq!(
            buffer.volume().unwrap().get([3, 3, 3]),
            VoxelInstance::new(2)
        );

        // Second call returns the already-attached buffer.
        assert!(section.get_buffer(chunk_p, &scene, false).is_attached());
    }

    #[test]
    fn test_get_buffer_survives_malformed_blob() {
        let mut section = Section::new(SectionPos::new(0, 0, 0), CHUNK_SIZE, SECTION_SIZE);
        let scene = SceneHandle::new();
        let chunk_p = ChunkPos::new(0, 1, 0);

        let node_id = scene.access(|s| {
            let id = s.create_child("chunk");
            s.get_mut(id)
                .unwrap()
                .set_var(VOXEL_DATA_KEY, vec![0xFF, 0x00, 0x01]);
            id
        });
        section.set_node_id(chunk_p, node_id);

        let buffer = section.get_buffer(chunk_p, &scene, false);
        assert!(!buffer.is_attached());
    }

    #[test]
    fn test_detach_clears_dirty() {
        let mut buffer = ChunkBuffer::default();
        buffer.attach(VoxelVolume::new(Region::from_corners(0, 0, 0, 1, 1, 1)));
        buffer.dirty = true;
        buffer.detach();
        assert!(!buffer.is_attached());
        assert!(!buffer.dirty);
    }
}
