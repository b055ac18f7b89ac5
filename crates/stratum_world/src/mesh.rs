//! # Mesh and Collision Helpers
//!
//! Consumers of committed chunk blobs:
//!
//! - [`build_physics_boxes`] merges solid voxels into axis-aligned boxes
//!   for the collision rebuild that drains the physics queue
//! - [`build_chunk_mesh`] produces a face-culled triangle mesh, optionally
//!   at a reduced level of detail
//! - [`ChunkMeshTask`] wraps meshing in the three-phase task contract so
//!   it runs on the worker pool
//!
//! The one-voxel padding ring of chunk volumes supplies neighbor edges, so
//! meshing a chunk never reads another chunk's buffer.

use std::sync::Arc;

use tracing::warn;

use stratum_core::{NodeId, SceneHandle};
use stratum_task::{Progress, Task};

use crate::codec;
use crate::section::VOXEL_DATA_KEY;
use crate::volume::{Region, Volume, VoxelVolume};
use crate::voxel::VoxelRegistry;

/// Node variable carrying the encoded collision boxes.
pub const PHYSICS_BOXES_KEY: &str = "buildat_physics_boxes";

/// Node variable carrying the encoded render mesh.
pub const MESH_DATA_KEY: &str = "buildat_mesh_data";

/// Coarsest level of detail the mesher produces.
pub const MAX_LOD: u32 = 3;

/// Triangle mesh of one chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Vertex positions in chunk-local voxel units.
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals.
    pub normals: Vec<[f32; 3]>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Whether the mesh holds no geometry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

const FACES: [([i32; 3], [f32; 3]); 6] = [
    ([-1, 0, 0], [-1.0, 0.0, 0.0]),
    ([1, 0, 0], [1.0, 0.0, 0.0]),
    ([0, -1, 0], [0.0, -1.0, 0.0]),
    ([0, 1, 0], [0.0, 1.0, 0.0]),
    ([0, 0, -1], [0.0, 0.0, -1.0]),
    ([0, 0, 1], [0.0, 0.0, 1.0]),
];

/// Corner offsets of the quad facing direction `face`, wound outward.
const fn face_corners(face: usize) -> [[i32; 3]; 4] {
    match face {
        0 => [[0, 0, 0], [0, 0, 1], [0, 1, 1], [0, 1, 0]],
        1 => [[1, 0, 0], [1, 1, 0], [1, 1, 1], [1, 0, 1]],
        2 => [[0, 0, 0], [1, 0, 0], [1, 0, 1], [0, 0, 1]],
        3 => [[0, 1, 0], [0, 1, 1], [1, 1, 1], [1, 1, 0]],
        4 => [[0, 0, 0], [0, 1, 0], [1, 1, 0], [1, 0, 0]],
        _ => [[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]],
    }
}

/// Interior region of a padded chunk volume.
fn interior(volume: &VoxelVolume) -> Region {
    let l = volume.region().lower();
    let u = volume.region().upper();
    Region::from_corners(l[0] + 1, l[1] + 1, l[2] + 1, u[0] - 1, u[1] - 1, u[2] - 1)
}

/// Builds a face-culled triangle mesh of the volume's interior.
///
/// `lod` 0 meshes per voxel. Higher levels mesh `2^lod`-wide supercells, a
/// supercell counting as solid when any contained voxel is; `lod` is
/// clamped to [`MAX_LOD`].
#[must_use]
pub fn build_chunk_mesh(volume: &VoxelVolume, registry: &VoxelRegistry, lod: u32) -> MeshData {
    let step = 1i32 << lod.min(MAX_LOD);
    let inner = interior(volume);
    let l = inner.lower();

    let cells = [
        (inner.width() + step - 1) / step,
        (inner.height() + step - 1) / step,
        (inner.depth() + step - 1) / step,
    ];
    let coarse_region =
        Region::from_corners(0, 0, 0, cells[0] - 1, cells[1] - 1, cells[2] - 1);
    let mut occupancy: Volume<u8> = Volume::new(coarse_region);
    for cz in 0..cells[2] {
        for cy in 0..cells[1] {
            for cx in 0..cells[0] {
                if supercell_solid(volume, registry, inner, [cx, cy, cz], step) {
                    occupancy.set([cx, cy, cz], 1);
                }
            }
        }
    }

    let mut mesh = MeshData::default();
    for cz in 0..cells[2] {
        for cy in 0..cells[1] {
            for cx in 0..cells[0] {
                if occupancy.get([cx, cy, cz]) == 0 {
                    continue;
                }
                for (face, (dir, normal)) in FACES.iter().enumerate() {
                    let neighbor = [cx + dir[0], cy + dir[1], cz + dir[2]];
                    let covered = if coarse_region.contains(neighbor) {
                        occupancy.get(neighbor) != 0
                    } else if step == 1 {
                        // The padding ring carries the neighbor chunk's
                        // edge voxels, so seams stay closed at full detail.
                        let p = [
                            l[0] + neighbor[0],
                            l[1] + neighbor[1],
                            l[2] + neighbor[2],
                        ];
                        registry.is_solid(volume.get(p))
                    } else {
                        false
                    };
                    if covered {
                        continue;
                    }
                    emit_quad(&mut mesh, [cx, cy, cz], face, *normal, step, l);
                }
            }
        }
    }
    mesh
}

fn supercell_solid(
    volume: &VoxelVolume,
    registry: &VoxelRegistry,
    inner: Region,
    cell: [i32; 3],
    step: i32,
) -> bool {
    let l = inner.lower();
    for dz in 0..step {
        for dy in 0..step {
            for dx in 0..step {
                let p = [
                    l[0] + cell[0] * step + dx,
                    l[1] + cell[1] * step + dy,
                    l[2] + cell[2] * step + dz,
                ];
                if inner.contains(p) && registry.is_solid(volume.get(p)) {
                    return true;
                }
            }
        }
    }
    false
}

fn emit_quad(
    mesh: &mut MeshData,
    cell: [i32; 3],
    face: usize,
    normal: [f32; 3],
    step: i32,
    origin: [i32; 3],
) {
    let base = mesh.positions.len() as u32;
    for corner in face_corners(face) {
        let p = [
            (origin[0] + (cell[0] + corner[0]) * step) as f32,
            (origin[1] + (cell[1] + corner[1]) * step) as f32,
            (origin[2] + (cell[2] + corner[2]) * step) as f32,
        ];
        mesh.positions.push(p);
        mesh.normals.push(normal);
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Merges the volume's solid interior voxels into collision boxes.
///
/// Greedy per z-slice: runs along x grow into rectangles along y, and
/// rectangles with identical footprints on consecutive slices fuse along
/// z. Boxes are regions of voxel cells in the volume's own coordinates.
#[must_use]
pub fn build_physics_boxes(volume: &VoxelVolume, registry: &VoxelRegistry) -> Vec<Region> {
    let inner = interior(volume);
    let l = inner.lower();
    let w = inner.width();
    let h = inner.height();

    let mut boxes: Vec<Region> = Vec::new();
    for z in l[2]..=inner.upper()[2] {
        let mut visited = vec![false; (w * h) as usize];
        let mask_index = |x: i32, y: i32| ((y - l[1]) * w + (x - l[0])) as usize;
        let solid =
            |x: i32, y: i32| registry.is_solid(volume.get([x, y, z]));

        let mut slice_rects: Vec<Region> = Vec::new();
        for y in l[1]..=inner.upper()[1] {
            for x in l[0]..=inner.upper()[0] {
                if visited[mask_index(x, y)] || !solid(x, y) {
                    continue;
                }
                // Grow the run along x.
                let mut x1 = x;
                while x1 + 1 <= inner.upper()[0]
                    && !visited[mask_index(x1 + 1, y)]
                    && solid(x1 + 1, y)
                {
                    x1 += 1;
                }
                // Grow the rectangle along y while every cell matches.
                let mut y1 = y;
                'grow: while y1 + 1 <= inner.upper()[1] {
                    for xi in x..=x1 {
                        if visited[mask_index(xi, y1 + 1)] || !solid(xi, y1 + 1) {
                            break 'grow;
                        }
                    }
                    y1 += 1;
                }
                for yi in y..=y1 {
                    for xi in x..=x1 {
                        visited[mask_index(xi, yi)] = true;
                    }
                }
                slice_rects.push(Region::from_corners(x, y, z, x1, y1, z));
            }
        }

        // Fuse with identical footprints ending on the previous slice.
        for rect in slice_rects {
            let fused = boxes.iter_mut().find(|b| {
                b.upper()[2] == z - 1
                    && b.lower()[0] == rect.lower()[0]
                    && b.upper()[0] == rect.upper()[0]
                    && b.lower()[1] == rect.lower()[1]
                    && b.upper()[1] == rect.upper()[1]
            });
            match fused {
                Some(b) => {
                    *b = Region::new(b.lower(), [b.upper()[0], b.upper()[1], z]);
                }
                None => boxes.push(rect),
            }
        }
    }
    boxes
}

/// Encodes collision boxes for node storage: `u32` count, then six `i32`
/// corners per box, little-endian.
#[must_use]
pub fn encode_physics_boxes(boxes: &[Region]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + boxes.len() * 24);
    out.extend_from_slice(&(boxes.len() as u32).to_le_bytes());
    for b in boxes {
        for c in b.lower().into_iter().chain(b.upper()) {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    out
}

/// Decodes collision boxes. `None` on truncated input.
#[must_use]
pub fn decode_physics_boxes(bytes: &[u8]) -> Option<Vec<Region>> {
    let count = u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as usize;
    let body = bytes.get(4..)?;
    if body.len() != count * 24 {
        return None;
    }
    let mut boxes = Vec::with_capacity(count);
    for record in body.chunks_exact(24) {
        let mut c = [0i32; 6];
        for (i, v) in c.iter_mut().enumerate() {
            *v = i32::from_le_bytes(record[i * 4..i * 4 + 4].try_into().ok()?);
        }
        boxes.push(Region::from_corners(c[0], c[1], c[2], c[3], c[4], c[5]));
    }
    Some(boxes)
}

/// Encodes a mesh for node storage: vertex and index counts, positions,
/// normals, indices, all little-endian.
#[must_use]
pub fn encode_mesh(mesh: &MeshData) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(8 + mesh.positions.len() * 24 + mesh.indices.len() * 4);
    out.extend_from_slice(&(mesh.positions.len() as u32).to_le_bytes());
    out.extend_from_slice(&(mesh.indices.len() as u32).to_le_bytes());
    for p in &mesh.positions {
        for v in p {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    for n in &mesh.normals {
        for v in n {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    for i in &mesh.indices {
        out.extend_from_slice(&i.to_le_bytes());
    }
    out
}

/// Generates a chunk mesh off the owner thread.
///
/// `pre` snapshots the node's blob under the scene gate, `thread` decodes
/// and meshes it, `post` stores the encoded mesh back on the node. The
/// task owns every byte it works on; workers never see the scene.
pub struct ChunkMeshTask {
    scene: SceneHandle,
    registry: Arc<VoxelRegistry>,
    node_id: NodeId,
    lod: u32,
    blob: Option<Vec<u8>>,
    mesh: Option<MeshData>,
}

impl ChunkMeshTask {
    /// Creates a mesh task for the chunk held by `node_id`.
    #[must_use]
    pub fn new(scene: SceneHandle, registry: Arc<VoxelRegistry>, node_id: NodeId, lod: u32) -> Self {
        Self {
            scene,
            registry,
            node_id,
            lod,
            blob: None,
            mesh: None,
        }
    }
}

impl Task for ChunkMeshTask {
    fn pre(&mut self) -> Progress {
        let node_id = self.node_id;
        self.blob = self.scene.access(|scene| {
            scene
                .get(node_id)
                .and_then(|node| node.var(VOXEL_DATA_KEY))
                .map(<[u8]>::to_vec)
        });
        if self.blob.is_none() {
            warn!(node_id, "mesh task found no voxel data; skipping");
        }
        Progress::Done
    }

    fn thread(&mut self) -> Progress {
        let Some(blob) = self.blob.take() else {
            return Progress::Done;
        };
        match codec::decode(&blob) {
            Ok(volume) => {
                self.mesh = Some(build_chunk_mesh(&volume, &self.registry, self.lod));
            }
            Err(err) => {
                warn!(node_id = self.node_id, error = %err, "mesh task blob undecodable");
            }
        }
        Progress::Done
    }

    fn post(&mut self) -> Progress {
        let Some(mesh) = self.mesh.take() else {
            return Progress::Done;
        };
        let node_id = self.node_id;
        let encoded = encode_mesh(&mesh);
        self.scene.access(|scene| match scene.get_mut(node_id) {
            Some(node) => node.set_var(MESH_DATA_KEY, encoded),
            None => warn!(node_id, "mesh task target node vanished"),
        });
        Progress::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::VoxelInstance;

    fn padded_volume(size: i32) -> VoxelVolume {
        VoxelVolume::new(Region::from_corners(-1, -1, -1, size, size, size))
    }

    #[test]
    fn test_single_voxel_meshes_as_cube() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(8);
        volume.set([3, 3, 3], VoxelInstance::new(2));
        let mesh = build_chunk_mesh(&volume, &registry, 0);
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
    }

    #[test]
    fn test_buried_faces_are_culled() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(8);
        // A 3x3x3 solid block: only the 54 outer faces survive.
        for z in 2..5 {
            for y in 2..5 {
                for x in 2..5 {
                    volume.set([x, y, z], VoxelInstance::new(2));
                }
            }
        }
        let mesh = build_chunk_mesh(&volume, &registry, 0);
        assert_eq!(mesh.indices.len() / 6, 54);
    }

    #[test]
    fn test_padding_ring_closes_seams() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(4);
        // Interior voxel on the -x border, neighbor copy in the padding.
        volume.set([0, 1, 1], VoxelInstance::new(2));
        volume.set([-1, 1, 1], VoxelInstance::new(2));
        let mesh = build_chunk_mesh(&volume, &registry, 0);
        // 5 faces instead of 6: the -x face is covered by the neighbor.
        assert_eq!(mesh.indices.len() / 6, 5);
    }

    #[test]
    fn test_lod_reduces_quad_count() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(8);
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    volume.set([x, y, z], VoxelInstance::new(2));
                }
            }
        }
        let full = build_chunk_mesh(&volume, &registry, 0);
        let coarse = build_chunk_mesh(&volume, &registry, MAX_LOD);
        assert!(coarse.indices.len() < full.indices.len());
        assert!(!coarse.is_empty());
    }

    #[test]
    fn test_air_contributes_no_geometry() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(4);
        volume.set([1, 1, 1], VoxelInstance::new(1));
        let mesh = build_chunk_mesh(&volume, &registry, 0);
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_physics_boxes_merge_solid_slab() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(8);
        for z in 0..8 {
            for y in 0..2 {
                for x in 0..8 {
                    volume.set([x, y, z], VoxelInstance::new(2));
                }
            }
        }
        let boxes = build_physics_boxes(&volume, &registry);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].lower(), [0, 0, 0]);
        assert_eq!(boxes[0].upper(), [7, 1, 7]);
    }

    #[test]
    fn test_physics_boxes_separate_disjoint_solids() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(8);
        volume.set([0, 0, 0], VoxelInstance::new(2));
        volume.set([5, 5, 5], VoxelInstance::new(3));
        let boxes = build_physics_boxes(&volume, &registry);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_physics_boxes_ignore_padding() {
        let registry = VoxelRegistry::with_defaults();
        let mut volume = padded_volume(4);
        volume.set([-1, 0, 0], VoxelInstance::new(2));
        volume.set([4, 0, 0], VoxelInstance::new(2));
        assert!(build_physics_boxes(&volume, &registry).is_empty());
    }

    #[test]
    fn test_physics_boxes_encode_roundtrip() {
        let boxes = vec![
            Region::from_corners(0, 0, 0, 7, 1, 7),
            Region::from_corners(3, 3, 3, 3, 3, 3),
        ];
        let encoded = encode_physics_boxes(&boxes);
        assert_eq!(decode_physics_boxes(&encoded), Some(boxes));
        assert_eq!(decode_physics_boxes(&encoded[..7]), None);
    }

    #[test]
    fn test_mesh_task_phases_produce_node_mesh() {
        let registry = Arc::new(VoxelRegistry::with_defaults());
        let scene = SceneHandle::new();
        let mut volume = padded_volume(4);
        volume.set([1, 1, 1], VoxelInstance::new(2));
        let node_id = scene.access(|s| {
            let id = s.create_child("chunk");
            s.get_mut(id)
                .unwrap()
                .set_var(VOXEL_DATA_KEY, codec::encode_compressed(&volume));
            id
        });

        let mut task = ChunkMeshTask::new(scene.clone(), registry, node_id, 0);
        assert_eq!(task.pre(), Progress::Done);
        assert_eq!(task.thread(), Progress::Done);
        assert_eq!(task.post(), Progress::Done);

        let stored = scene.access(|s| s.get(node_id).unwrap().var(MESH_DATA_KEY).map(<[u8]>::to_vec));
        let stored = stored.unwrap();
        // 24 vertices, 36 indices for one cube.
        assert_eq!(
            &stored[..8],
            &[24u8, 0, 0, 0, 36, 0, 0, 0]
        );
    }

    #[test]
    fn test_mesh_task_survives_missing_node() {
        let registry = Arc::new(VoxelRegistry::with_defaults());
        let scene = SceneHandle::new();
        let mut task = ChunkMeshTask::new(scene, registry, 99, 0);
        assert_eq!(task.pre(), Progress::Done);
        assert_eq!(task.thread(), Progress::Done);
        assert_eq!(task.post(), Progress::Done);
    }
}
