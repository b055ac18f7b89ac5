//! # Stratum Server Crate
//!
//! Composition of the voxel world core into a runnable headless server:
//! command line, configuration, the owner-thread tick loop, and the
//! built-in worldgen module. The `stratum_server` binary is a thin shell
//! over [`Server`].

pub mod cli;
pub mod config;
pub mod server;
pub mod worldgen;

pub use cli::{print_usage, CliError, CliOptions};
pub use config::{ConfigError, ServerConfig};
pub use server::{Server, ShutdownFlag};
pub use worldgen::WorldGen;
