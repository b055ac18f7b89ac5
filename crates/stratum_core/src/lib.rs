//! # Stratum Core
//!
//! Owner-thread collaborators of the voxel world core:
//!
//! - [`Scene`] - a keyed store of opaque nodes holding named binary
//!   variables, accessed exclusively through [`SceneHandle`]
//! - [`EventBus`] and [`Module`] - the dispatch seam between subsystems
//! - [`Replicate`] - deferred post-sync event emission and per-peer node
//!   knowledge
//!
//! ## Threading Model
//!
//! Everything in this crate belongs to the owner thread. The only
//! synchronization primitive is the scene gate, which exists because worker
//! task `pre`/`post` phases and the tick handler interleave their access to
//! the same store within that thread's call tree.

pub mod events;
pub mod replicate;
pub mod scene;

pub use events::{dispatch, Event, EventBus, EventKind, Module};
pub use replicate::{PeerId, Replicate};
pub use scene::{Node, NodeId, Scene, SceneHandle};
