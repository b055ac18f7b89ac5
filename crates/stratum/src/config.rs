//! Server configuration, loaded once at startup from `stratum.toml` and
//! overlaid with command-line values.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use stratum_world::WorldConfig;

use crate::cli::CliOptions;

/// Name of the optional config file looked up next to the module path.
pub const CONFIG_FILE_NAME: &str = "stratum.toml";

/// Configuration problems that abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Whole-server configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// World parameters.
    pub world: WorldConfig,
    /// Worker threads in the task pool.
    pub workers: usize,
    /// Owner tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Sections the worldgen module fills per tick.
    pub generation_sections_per_tick: usize,
    /// Worldgen heightfield seed.
    pub worldgen_seed: u64,
    /// Build output path (`-r`).
    pub build_path: String,
    /// Interface definitions path (`-i`).
    pub interface_path: String,
    /// Shared data path (`-S`).
    pub share_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            workers: 2,
            tick_interval_ms: 100,
            generation_sections_per_tick: 1,
            worldgen_seed: 13_241,
            build_path: String::new(),
            interface_path: String::new(),
            share_path: String::new(),
        }
    }
}

impl ServerConfig {
    /// Loads `stratum.toml` from the given directory; absent files yield
    /// the defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the file exists but is unreadable or invalid.
    pub fn load_near(module_path: &Path) -> Result<Self, ConfigError> {
        let file = module_path.join(CONFIG_FILE_NAME);
        if !file.exists() {
            debug!(file = %file.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&file)?;
        let config = toml::from_str(&text)?;
        debug!(file = %file.display(), "config file loaded");
        Ok(config)
    }

    /// Overlays command-line values onto the file-derived configuration.
    pub fn apply_cli(&mut self, options: &CliOptions) {
        if let Some(build_path) = &options.build_path {
            self.build_path.clone_from(build_path);
        }
        if let Some(interface_path) = &options.interface_path {
            self.interface_path.clone_from(interface_path);
        }
        if let Some(share_path) = &options.share_path {
            self.share_path.clone_from(share_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.world.chunk_size_voxels, [32, 32, 32]);
    }

    #[test]
    fn test_toml_overlays_nested_world_table() {
        let config: ServerConfig = toml::from_str(
            r#"
            workers = 4

            [world]
            chunk_size_voxels = [16, 16, 16]
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.world.chunk_size_voxels, [16, 16, 16]);
        assert_eq!(config.world.section_size_chunks, [2, 2, 2]);
    }

    #[test]
    fn test_cli_overlay_wins() {
        let mut config = ServerConfig::default();
        config.share_path = "from_file".to_owned();
        let options = CliOptions {
            module_path: "mods".to_owned(),
            build_path: None,
            interface_path: Some("iface".to_owned()),
            share_path: Some("share".to_owned()),
        };
        config.apply_cli(&options);
        assert_eq!(config.share_path, "share");
        assert_eq!(config.interface_path, "iface");
        assert!(config.build_path.is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ServerConfig::load_near(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
