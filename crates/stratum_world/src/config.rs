//! World parameters, fixed once per world instance.

use serde::Deserialize;

/// Configuration of one world instance.
///
/// Chunk and section dimensions are wire-visible (the `voxelworld:init`
/// handshake carries them), so they are i16 triples end to end.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorldConfig {
    /// Chunk dimensions in voxels.
    pub chunk_size_voxels: [i16; 3],
    /// Section dimensions in chunks.
    pub section_size_chunks: [i16; 3],
    /// Capacity of the recently-used section cache.
    pub section_cache_size: usize,
    /// Lower corner of the section region loaded at startup.
    pub spawn_sections_min: [i16; 3],
    /// Upper corner of the section region loaded at startup.
    pub spawn_sections_max: [i16; 3],
    /// Level of detail for worker-generated chunk meshes.
    pub mesh_lod: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size_voxels: [32, 32, 32],
            section_size_chunks: [2, 2, 2],
            section_cache_size: 2,
            spawn_sections_min: [-1, -1, -1],
            spawn_sections_max: [1, 1, 1],
            mesh_lod: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.chunk_size_voxels, [32, 32, 32]);
        assert_eq!(config.section_size_chunks, [2, 2, 2]);
        assert_eq!(config.section_cache_size, 2);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: WorldConfig = toml::from_str(
            r#"
            chunk_size_voxels = [8, 8, 8]
            spawn_sections_max = [0, 0, 0]
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size_voxels, [8, 8, 8]);
        assert_eq!(config.section_size_chunks, [2, 2, 2]);
        assert_eq!(config.spawn_sections_max, [0, 0, 0]);
    }
}
