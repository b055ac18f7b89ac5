//! # Volume Codec
//!
//! Serializes a voxel volume to a portable binary blob, carried both in
//! the chunk nodes' `buildat_voxel_data` variable and on the wire.
//!
//! ## Blob Format
//!
//! ```text
//! raw:        [tag: u8 = 0]
//!             [x0 y0 z0 x1 y1 z1 : i32 LE]   enclosing region corners
//!             [word: u32 LE] * cell_count    row-major, z outermost
//! compressed: [tag: u8 = 1]
//!             [LZ4 block with u32 LE size prefix] of the raw body
//! ```
//!
//! One decoder accepts both forms; round trips are bit-identical in both
//! directions. Decoding never panics on foreign bytes: every malformed
//! shape maps to a [`CodecError`].

use lz4_flex::block::{compress_prepend_size, decompress_size_prepended};
use thiserror::Error;

use crate::volume::{Region, Volume, VoxelVolume};
use crate::voxel::VoxelInstance;

/// Blob tag for the uncompressed form.
pub const CODEC_RAW: u8 = 0;

/// Blob tag for the LZ4-compressed form.
pub const CODEC_LZ4: u8 = 1;

/// Widest region edge the decoder accepts.
const MAX_EDGE: i32 = 4096;

/// Most cells the decoder will allocate.
const MAX_CELLS: usize = 1 << 27;

/// Ways a blob can fail to be a volume.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The blob ended before the structure it promises.
    #[error("volume blob is truncated")]
    Truncated,

    /// The leading codec tag is unknown.
    #[error("unknown volume codec tag {0}")]
    BadCodecTag(u8),

    /// The corners describe an inverted or unreasonably large region.
    #[error("volume region corners are invalid")]
    BadRegion,

    /// The word payload does not match the region's cell count.
    #[error("volume word count mismatch: region wants {expected}, blob has {actual}")]
    CornerMismatch {
        /// Cells the corners promise.
        expected: usize,
        /// Words the payload carries.
        actual: usize,
    },

    /// The LZ4 block failed to decompress.
    #[error("volume decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// Encodes a volume into the raw (uncompressed) blob form.
#[must_use]
pub fn encode(volume: &VoxelVolume) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 24 + volume.words().len() * 4);
    out.push(CODEC_RAW);
    encode_body(volume, &mut out);
    out
}

/// Encodes a volume into the LZ4-compressed blob form.
#[must_use]
pub fn encode_compressed(volume: &VoxelVolume) -> Vec<u8> {
    let mut body = Vec::with_capacity(24 + volume.words().len() * 4);
    encode_body(volume, &mut body);
    let mut out = Vec::with_capacity(1 + body.len() / 2);
    out.push(CODEC_LZ4);
    out.extend_from_slice(&compress_prepend_size(&body));
    out
}

/// Decodes a blob produced by either encoder.
///
/// # Errors
///
/// Any [`CodecError`]; callers treating foreign data follow the
/// warn-and-treat-as-missing policy.
pub fn decode(bytes: &[u8]) -> Result<VoxelVolume, CodecError> {
    let (&tag, rest) = bytes.split_first().ok_or(CodecError::Truncated)?;
    match tag {
        CODEC_RAW => decode_body(rest),
        CODEC_LZ4 => {
            let body = decompress_size_prepended(rest)?;
            decode_body(&body)
        }
        other => Err(CodecError::BadCodecTag(other)),
    }
}

fn encode_body(volume: &VoxelVolume, out: &mut Vec<u8>) {
    let region = volume.region();
    for c in region.lower().into_iter().chain(region.upper()) {
        out.extend_from_slice(&c.to_le_bytes());
    }
    for word in volume.words() {
        out.extend_from_slice(&word.data.to_le_bytes());
    }
}

fn decode_body(bytes: &[u8]) -> Result<VoxelVolume, CodecError> {
    if bytes.len() < 24 {
        return Err(CodecError::Truncated);
    }
    let mut corners = [0i32; 6];
    for (i, corner) in corners.iter_mut().enumerate() {
        let chunk: [u8; 4] = bytes[i * 4..i * 4 + 4]
            .try_into()
            .map_err(|_| CodecError::Truncated)?;
        *corner = i32::from_le_bytes(chunk);
    }
    let lower = [corners[0], corners[1], corners[2]];
    let upper = [corners[3], corners[4], corners[5]];
    for axis in 0..3 {
        let edge = i64::from(upper[axis]) - i64::from(lower[axis]) + 1;
        if edge <= 0 || edge > i64::from(MAX_EDGE) {
            return Err(CodecError::BadRegion);
        }
    }
    let region = Region::new(lower, upper);
    let expected = region.cell_count();
    if expected > MAX_CELLS {
        return Err(CodecError::BadRegion);
    }

    let word_bytes = &bytes[24..];
    if word_bytes.len() % 4 != 0 {
        return Err(CodecError::Truncated);
    }
    let actual = word_bytes.len() / 4;
    if actual != expected {
        return Err(CodecError::CornerMismatch { expected, actual });
    }

    let mut words = Vec::with_capacity(expected);
    for chunk in word_bytes.chunks_exact(4) {
        let data = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        words.push(VoxelInstance { data });
    }
    // Count was checked against the region above.
    Volume::from_words(region, words).ok_or(CodecError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_volume() -> VoxelVolume {
        let region = Region::from_corners(-1, -1, -1, 4, 4, 4);
        let mut volume = Volume::new(region);
        volume.set([0, 0, 0], VoxelInstance::new(2));
        volume.set([-1, 3, 4], VoxelInstance::with_attributes(5, 3));
        volume.set([4, 4, 4], VoxelInstance::new(1));
        volume
    }

    #[test]
    fn test_raw_roundtrip_is_bit_identical() {
        let volume = sample_volume();
        let blob = encode(&volume);
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded, volume);
        assert_eq!(encode(&decoded), blob);
    }

    #[test]
    fn test_compressed_roundtrip_is_bit_identical() {
        let volume = sample_volume();
        let blob = encode_compressed(&volume);
        assert_eq!(blob[0], CODEC_LZ4);
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded, volume);
        assert_eq!(encode_compressed(&decoded), blob);
    }

    #[test]
    fn test_compression_shrinks_uniform_volumes() {
        let region = Region::from_corners(-1, -1, -1, 32, 32, 32);
        let volume = VoxelVolume::new(region);
        let raw = encode(&volume);
        let compressed = encode_compressed(&volume);
        assert!(compressed.len() < raw.len() / 10);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = encode(&sample_volume());
        assert!(matches!(
            decode(&blob[..blob.len() - 1]),
            Err(CodecError::Truncated)
        ));
        assert!(matches!(decode(&[]), Err(CodecError::Truncated)));
        assert!(matches!(decode(&[CODEC_RAW, 1, 2]), Err(CodecError::Truncated)));
    }

    #[test]
    fn test_bad_tag_is_rejected() {
        assert!(matches!(
            decode(&[7, 0, 0, 0]),
            Err(CodecError::BadCodecTag(7))
        ));
    }

    #[test]
    fn test_word_count_mismatch_is_rejected() {
        let mut blob = encode(&sample_volume());
        // Drop one whole word: still 4-aligned, but short of the corners.
        blob.truncate(blob.len() - 4);
        assert!(matches!(
            decode(&blob),
            Err(CodecError::CornerMismatch { .. })
        ));
    }

    #[test]
    fn test_inverted_corners_are_rejected() {
        let mut blob = vec![CODEC_RAW];
        for c in [0i32, 0, 0, -2, 0, 0] {
            blob.extend_from_slice(&c.to_le_bytes());
        }
        assert!(matches!(decode(&blob), Err(CodecError::BadRegion)));
    }

    #[test]
    fn test_oversized_region_is_rejected_before_allocation() {
        let mut blob = vec![CODEC_RAW];
        for c in [0i32, 0, 0, 1 << 20, 1 << 20, 1 << 20] {
            blob.extend_from_slice(&c.to_le_bytes());
        }
        assert!(matches!(decode(&blob), Err(CodecError::BadRegion)));
    }

    #[test]
    fn test_corrupt_lz4_block_is_rejected() {
        let mut blob = encode_compressed(&sample_volume());
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        blob.truncate(blob.len() - 2);
        assert!(decode(&blob).is_err());
    }
}
