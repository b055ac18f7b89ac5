//! # Frames and Packet-Name Registration
//!
//! Every message travels in a `u16 type, u32 size, payload` frame. Numeric
//! type ids mean nothing on their own: they are assigned dynamically per
//! connection and announced through a distinguished type-0 frame carrying
//! `u16 numeric_type, u32 name_len, bytes name`. The canonical identifier
//! of a packet is always its name.

use std::collections::HashMap;

use crate::wire::{WireReader, WireWriter};
use crate::NetError;

/// Frame type reserved for name registration.
pub const FRAME_TYPE_REGISTRATION: u16 = 0;

/// Sanity ceiling for a single frame payload.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// One decoded wire frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Numeric frame type (0 = registration).
    pub frame_type: u16,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encodes the frame into its wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(6 + self.payload.len());
        writer.write_u16(self.frame_type);
        writer.write_u32(self.payload.len() as u32);
        writer.write_bytes(&self.payload);
        writer.into_bytes()
    }
}

/// Incremental frame decoder over a growing byte stream.
///
/// Feed received bytes in with [`FrameDecoder::feed`], then drain complete
/// frames with [`FrameDecoder::next_frame`]. Partial frames stay buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends received bytes to the stream buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes currently buffered.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extracts the next complete frame, if the buffer holds one.
    ///
    /// # Errors
    ///
    /// [`NetError::PayloadTooLarge`] when the length field exceeds the
    /// ceiling; the stream is unrecoverable at that point.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, NetError> {
        let mut reader = WireReader::new(&self.buffer);
        let Some(frame_type) = reader.read_u16() else {
            return Ok(None);
        };
        let Some(size) = reader.read_u32() else {
            return Ok(None);
        };
        if size > MAX_PAYLOAD_SIZE {
            return Err(NetError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let Some(payload) = reader.read_bytes(size as usize) else {
            return Ok(None);
        };
        let frame = Frame {
            frame_type,
            payload: payload.to_vec(),
        };
        let consumed = 6 + size as usize;
        self.buffer.drain(..consumed);
        Ok(Some(frame))
    }
}

/// Per-connection mapping between packet names and numeric frame types.
///
/// Type ids are handed out from 1 in registration order; a registration
/// frame is produced for each new name so the other end can mirror the
/// table.
#[derive(Debug)]
pub struct PacketNameRegistry {
    by_name: HashMap<String, u16>,
    by_type: HashMap<u16, String>,
    next_type: u16,
}

impl Default for PacketNameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketNameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            next_type: 1,
        }
    }

    /// Returns the type id for `name`, assigning one on first use.
    ///
    /// The second tuple field carries the registration frame that must
    /// precede the first data frame of a newly assigned name.
    pub fn register(&mut self, name: &str) -> (u16, Option<Frame>) {
        if let Some(&t) = self.by_name.get(name) {
            return (t, None);
        }
        let t = self.next_type;
        self.next_type += 1;
        self.by_name.insert(name.to_owned(), t);
        self.by_type.insert(t, name.to_owned());
        (t, Some(Self::build_registration(t, name)))
    }

    /// Builds the announcement frame for an already-registered name.
    #[must_use]
    pub fn registration_frame(&self, name: &str) -> Option<Frame> {
        let t = self.type_for(name)?;
        Some(Self::build_registration(t, name))
    }

    fn build_registration(frame_type: u16, name: &str) -> Frame {
        let mut writer = WireWriter::with_capacity(6 + name.len());
        writer.write_u16(frame_type);
        writer.write_u32(name.len() as u32);
        writer.write_bytes(name.as_bytes());
        Frame {
            frame_type: FRAME_TYPE_REGISTRATION,
            payload: writer.into_bytes(),
        }
    }

    /// Looks up a previously registered name.
    #[must_use]
    pub fn type_for(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// Resolves a numeric type back to its canonical name.
    #[must_use]
    pub fn name_for(&self, frame_type: u16) -> Option<&str> {
        self.by_type.get(&frame_type).map(String::as_str)
    }

    /// Applies a registration frame received from the remote end.
    ///
    /// # Errors
    ///
    /// [`NetError::Truncated`] on a short payload, [`NetError::BadName`] on
    /// non-UTF-8 names.
    pub fn apply_registration(&mut self, payload: &[u8]) -> Result<(), NetError> {
        let mut reader = WireReader::new(payload);
        let frame_type = reader.read_u16().ok_or(NetError::Truncated { needed: 2 })?;
        let name_len = reader.read_u32().ok_or(NetError::Truncated { needed: 4 })?;
        let name_bytes = reader
            .read_bytes(name_len as usize)
            .ok_or(NetError::Truncated {
                needed: name_len as usize,
            })?;
        let name = std::str::from_utf8(name_bytes).map_err(|_| NetError::BadName)?;
        self.by_name.insert(name.to_owned(), frame_type);
        self.by_type.insert(frame_type, name.to_owned());
        if frame_type >= self.next_type {
            self.next_type = frame_type + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip_through_decoder() {
        let frame = Frame {
            frame_type: 3,
            payload: vec![9, 8, 7],
        };
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame.encode());
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_decoder_waits_for_partial_frames() {
        let frame = Frame {
            frame_type: 1,
            payload: vec![0xAA; 10],
        };
        let bytes = frame.encode();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..8]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.feed(&bytes[8..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
    }

    #[test]
    fn test_registry_assigns_from_one_and_is_stable() {
        let mut registry = PacketNameRegistry::new();
        let (t1, reg1) = registry.register("voxelworld:init");
        let (t2, reg2) = registry.register("voxelworld:get_section");
        let (t1_again, reg_again) = registry.register("voxelworld:init");
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
        assert_eq!(t1_again, 1);
        assert!(reg1.is_some());
        assert!(reg2.is_some());
        assert!(reg_again.is_none());
    }

    #[test]
    fn test_registration_frame_mirrors_remote_table() {
        let mut sender = PacketNameRegistry::new();
        let (t, reg) = sender.register("voxelworld:node_voxel_data_updated");
        let reg = reg.unwrap();
        assert_eq!(reg.frame_type, FRAME_TYPE_REGISTRATION);

        let mut receiver = PacketNameRegistry::new();
        receiver.apply_registration(&reg.payload).unwrap();
        assert_eq!(
            receiver.name_for(t),
            Some("voxelworld:node_voxel_data_updated")
        );
        assert_eq!(receiver.type_for("voxelworld:node_voxel_data_updated"), Some(t));
    }

    #[test]
    fn test_apply_registration_rejects_truncation() {
        let mut registry = PacketNameRegistry::new();
        assert!(matches!(
            registry.apply_registration(&[1]),
            Err(NetError::Truncated { .. })
        ));
    }
}
