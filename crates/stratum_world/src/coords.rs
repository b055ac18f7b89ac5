//! # Coordinate Hierarchy
//!
//! Three coordinate spaces, each a fixed-size cuboid of the previous:
//! voxels make chunks, chunks make sections. Conversions use floor
//! division so negative coordinates land in the container that actually
//! encloses them.

/// Floor-division container coordinate.
///
/// Places coordinate `x` into containers of size `d`: voxel -1 belongs to
/// container -1, voxel -d to container -1, voxel -d-1 to container -2.
#[inline]
#[must_use]
pub const fn container_coord(x: i32, d: i32) -> i32 {
    (if x >= 0 { x } else { x - d + 1 }) / d
}

/// Position of a voxel on the global integer lattice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelPos {
    /// X coordinate in voxels.
    pub x: i32,
    /// Y coordinate in voxels.
    pub y: i32,
    /// Z coordinate in voxels.
    pub z: i32,
}

impl VoxelPos {
    /// Creates a voxel position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Position of a chunk in the global chunk grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    /// X coordinate in chunks.
    pub x: i32,
    /// Y coordinate in chunks.
    pub y: i32,
    /// Z coordinate in chunks.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a chunk position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Position of a section in the global section grid.
///
/// Sections use i16 coordinates, matching their wire representation; the
/// narrowing conversion from chunk space is range-checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionPos {
    /// X coordinate in sections.
    pub x: i16,
    /// Y coordinate in sections.
    pub y: i16,
    /// Z coordinate in sections.
    pub z: i16,
}

impl SectionPos {
    /// Creates a section position.
    #[inline]
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// The position as an i16 triple, wire order.
    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    /// Builds a position from an i16 triple.
    #[inline]
    #[must_use]
    pub const fn from_array(v: [i16; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Widens an i16 size triple to i32 components.
#[inline]
#[must_use]
pub const fn size_i32(d: [i16; 3]) -> [i32; 3] {
    [d[0] as i32, d[1] as i32, d[2] as i32]
}

/// Maps a voxel position to the chunk containing it.
#[inline]
#[must_use]
pub const fn voxel_to_chunk(p: VoxelPos, chunk_size: [i16; 3]) -> ChunkPos {
    let d = size_i32(chunk_size);
    ChunkPos::new(
        container_coord(p.x, d[0]),
        container_coord(p.y, d[1]),
        container_coord(p.z, d[2]),
    )
}

/// Maps a chunk position to the section containing it.
///
/// Returns `None` when the section coordinate does not fit i16; callers
/// treat that as an addressing miss.
#[must_use]
pub fn chunk_to_section(c: ChunkPos, section_size: [i16; 3]) -> Option<SectionPos> {
    let d = size_i32(section_size);
    let x = container_coord(c.x, d[0]);
    let y = container_coord(c.y, d[1]);
    let z = container_coord(c.z, d[2]);
    Some(SectionPos::new(
        i16::try_from(x).ok()?,
        i16::try_from(y).ok()?,
        i16::try_from(z).ok()?,
    ))
}

/// Local coordinate of a voxel inside its chunk, in `0..chunk_size`.
#[inline]
#[must_use]
pub const fn local_in_chunk(p: VoxelPos, chunk: ChunkPos, chunk_size: [i16; 3]) -> [i32; 3] {
    let d = size_i32(chunk_size);
    [
        p.x - chunk.x * d[0],
        p.y - chunk.y * d[1],
        p.z - chunk.z * d[2],
    ]
}

/// Voxel position of a chunk's origin corner.
#[inline]
#[must_use]
pub const fn chunk_origin_voxel(chunk: ChunkPos, chunk_size: [i16; 3]) -> VoxelPos {
    let d = size_i32(chunk_size);
    VoxelPos::new(chunk.x * d[0], chunk.y * d[1], chunk.z * d[2])
}

/// Chunk position of a section's origin corner.
#[inline]
#[must_use]
pub const fn section_origin_chunk(section: SectionPos, section_size: [i16; 3]) -> ChunkPos {
    let d = size_i32(section_size);
    ChunkPos::new(
        section.x as i32 * d[0],
        section.y as i32 * d[1],
        section.z as i32 * d[2],
    )
}
