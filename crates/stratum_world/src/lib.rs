//! # Stratum World
//!
//! A spatially indexed, chunked, write-back cached store of voxel instances
//! over an effectively unbounded 3D integer grid.
//!
//! ## Coordinate Hierarchy
//!
//! ```text
//! voxel (i32)  --/ chunk_size -->  chunk (i32)  --/ section_size -->  section (i16)
//! ```
//!
//! Container coordinates use floor division, so voxel -1 lives in chunk -1,
//! not chunk 0.
//!
//! ## Write Path
//!
//! `set_voxel` resolves the owning section and chunk, lazily attaches a
//! mutable buffer (decoding the chunk blob out of the scene node on a
//! miss), mutates it in memory and marks it dirty. A later `commit`
//! serializes every dirty buffer back to its node, schedules the
//! `node_voxel_data_updated` event for after the next replication pass,
//! queues a collision-box rebuild, and detaches all buffers.

pub mod codec;
pub mod config;
pub mod coords;
pub mod mesh;
pub mod physics_queue;
pub mod section;
pub mod service;
pub mod volume;
pub mod voxel;
pub mod world;

pub use codec::{decode, encode, encode_compressed, CodecError};
pub use config::WorldConfig;
pub use coords::{container_coord, ChunkPos, SectionPos, VoxelPos};
pub use mesh::{build_chunk_mesh, build_physics_boxes, ChunkMeshTask, MeshData, PHYSICS_BOXES_KEY};
pub use physics_queue::{PhysicsUpdateQueue, QueuedNodePhysicsUpdate};
pub use section::{ChunkBuffer, Section, VOXEL_DATA_KEY};
pub use service::{SharedOutbox, SharedReplicate, SharedWorld, WorldService};
pub use volume::{Region, Volume, VoxelVolume};
pub use voxel::{VoxelDefinition, VoxelInstance, VoxelRegistry, VoxelTypeId};
pub use world::World;
