//! Voxel records and their flat wire format.
//!
//! # Format
//!
//! One 16-byte record per voxel, concatenated with no header or trailer:
//!
//! - Bytes 0-11: `x`, `y`, `z` (3 × i32, little-endian)
//! - Bytes 12-15: `r`, `g`, `b`, `a` (4 × u8)

use crate::error::{DecodeError, DecodeResult};

/// Size of one encoded voxel in bytes.
pub const VOXEL_RECORD_SIZE: usize = 3 * 4 + 4;

/// A colored cell on an integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Voxel {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Voxel {
    #[must_use]
    pub fn new(x: i32, y: i32, z: i32, [r, g, b, a]: [u8; 4]) -> Self {
        Self {
            x,
            y,
            z,
            r,
            g,
            b,
            a,
        }
    }

    #[must_use]
    pub fn color(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Append this voxel's record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.z.to_le_bytes());
        out.extend_from_slice(&self.color());
    }

    fn decode(record: &[u8; VOXEL_RECORD_SIZE]) -> Self {
        let int = |at: usize| {
            i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        Self::new(
            int(0),
            int(4),
            int(8),
            [record[12], record[13], record[14], record[15]],
        )
    }
}

/// Encode voxels into a flat record buffer.
#[must_use]
pub fn encode_voxels(voxels: &[Voxel]) -> Vec<u8> {
    let mut out = Vec::with_capacity(voxels.len() * VOXEL_RECORD_SIZE);
    for voxel in voxels {
        voxel.encode_into(&mut out);
    }
    out
}

/// Decode a flat record buffer.
///
/// # Errors
///
/// Returns an error if the buffer length is not a whole number of records.
pub fn decode_voxels(data: &[u8]) -> DecodeResult<Vec<Voxel>> {
    if !data.len().is_multiple_of(VOXEL_RECORD_SIZE) {
        return Err(DecodeError::InvalidFormat {
            context: "voxels",
            detail: format!(
                "length {} is not a multiple of {VOXEL_RECORD_SIZE}",
                data.len()
            ),
        });
    }

    Ok(data
        .chunks_exact(VOXEL_RECORD_SIZE)
        .filter_map(|chunk| <&[u8; VOXEL_RECORD_SIZE]>::try_from(chunk).ok())
        .map(Voxel::decode)
        .collect())
}
