//! # Voxel World Messages
//!
//! Payload codecs for the three packets the voxel world speaks. Layouts
//! follow the storage codec's integer conventions: little-endian, explicit
//! widths, coordinate triples as consecutive scalars.

use crate::wire::{WireReader, WireWriter};
use crate::NetError;

/// Server → client: world parameters, sent once after file transmission.
pub const MSG_INIT: &str = "voxelworld:init";

/// Client → server: interest in a section (currently informational).
pub const MSG_GET_SECTION: &str = "voxelworld:get_section";

/// Server → client: a chunk node's voxel data has been replicated.
pub const MSG_NODE_VOXEL_DATA_UPDATED: &str = "voxelworld:node_voxel_data_updated";

/// The `voxelworld:init` handshake payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitMessage {
    /// Chunk dimensions in voxels.
    pub chunk_size_voxels: [i16; 3],
    /// Section dimensions in chunks.
    pub section_size_chunks: [i16; 3],
}

impl InitMessage {
    /// Encodes the payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(12);
        writer.write_v3i16(self.chunk_size_voxels);
        writer.write_v3i16(self.section_size_chunks);
        writer.into_bytes()
    }

    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// [`NetError::Truncated`] on short input.
    pub fn decode(payload: &[u8]) -> Result<Self, NetError> {
        let mut reader = WireReader::new(payload);
        let chunk_size_voxels = reader.read_v3i16().ok_or(NetError::Truncated { needed: 6 })?;
        let section_size_chunks = reader.read_v3i16().ok_or(NetError::Truncated { needed: 6 })?;
        Ok(Self {
            chunk_size_voxels,
            section_size_chunks,
        })
    }
}

/// Encodes a `voxelworld:get_section` payload.
#[must_use]
pub fn encode_get_section(section_p: [i16; 3]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(6);
    writer.write_v3i16(section_p);
    writer.into_bytes()
}

/// Decodes a `voxelworld:get_section` payload.
///
/// # Errors
///
/// [`NetError::Truncated`] on short input.
pub fn decode_get_section(payload: &[u8]) -> Result<[i16; 3], NetError> {
    let mut reader = WireReader::new(payload);
    reader.read_v3i16().ok_or(NetError::Truncated { needed: 6 })
}

/// Encodes a `voxelworld:node_voxel_data_updated` payload.
#[must_use]
pub fn encode_node_voxel_data_updated(node_id: u32) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(4);
    writer.write_i32(node_id as i32);
    writer.into_bytes()
}

/// Decodes a `voxelworld:node_voxel_data_updated` payload.
///
/// # Errors
///
/// [`NetError::Truncated`] on short input.
pub fn decode_node_voxel_data_updated(payload: &[u8]) -> Result<u32, NetError> {
    let mut reader = WireReader::new(payload);
    reader
        .read_i32()
        .map(|id| id as u32)
        .ok_or(NetError::Truncated { needed: 4 })
}
