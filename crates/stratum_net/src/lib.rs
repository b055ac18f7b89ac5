//! # Stratum Net
//!
//! The wire-facing edge of the voxel world core.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Frame type (u16) │ Payload size (u32)         │
//! ├───────────────────────────────────────────────┤
//! │ Payload (variable)                            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Frame type 0 is reserved for packet-name registration; every other type
//! id is assigned dynamically, in registration order, and announced to the
//! peer before first use. Names are the canonical identifier.
//!
//! All integers are little-endian with explicit widths.

pub mod frame;
pub mod messages;
pub mod outbox;
pub mod wire;

pub use frame::{Frame, FrameDecoder, PacketNameRegistry, FRAME_TYPE_REGISTRATION};
pub use messages::{InitMessage, MSG_GET_SECTION, MSG_INIT, MSG_NODE_VOXEL_DATA_UPDATED};
pub use outbox::Outbox;
pub use wire::{WireReader, WireWriter};

use thiserror::Error;

/// Errors produced by the wire codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// The buffer ended before the structure it carries.
    #[error("truncated wire data: needed {needed} more bytes")]
    Truncated {
        /// How many bytes were missing.
        needed: usize,
    },

    /// A registration frame carried a name that is not valid UTF-8.
    #[error("packet name is not valid utf-8")]
    BadName,

    /// A frame referenced a type id that was never registered.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u16),

    /// A payload length field exceeded the sanity ceiling.
    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Declared payload size.
        size: u32,
        /// Enforced ceiling.
        max: u32,
    },
}
