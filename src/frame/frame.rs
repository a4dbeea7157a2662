//! Canonical raster frame.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DmdError, Result};
use crate::frame::Dimensions;

/// Number of bits needed to represent the values `0..n`.
pub fn bit_length(n: usize) -> u32 {
    if n <= 2 {
        return 1;
    }
    usize::BITS - (n - 1).leading_zeros()
}

/// Number of bytes needed to store `bits` bits.
pub fn byte_length(bits: u32) -> u32 {
    bits.div_ceil(8)
}

/// Sample depth of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitDepth {
    Gray2,
    Gray4,
    Gray6,
    Gray8,
    Rgb24,
}

impl BitDepth {
    pub const GRAY: [BitDepth; 4] = [
        BitDepth::Gray2,
        BitDepth::Gray4,
        BitDepth::Gray6,
        BitDepth::Gray8,
    ];

    pub const fn bits(self) -> u32 {
        match self {
            BitDepth::Gray2 => 2,
            BitDepth::Gray4 => 4,
            BitDepth::Gray6 => 6,
            BitDepth::Gray8 => 8,
            BitDepth::Rgb24 => 24,
        }
    }

    pub const fn is_gray(self) -> bool {
        !matches!(self, BitDepth::Rgb24)
    }

    /// Number of distinct sample values.
    pub const fn num_colors(self) -> usize {
        1 << self.bits()
    }

    /// Storage per pixel: one byte for every gray depth, three for RGB24.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            BitDepth::Rgb24 => 3,
            _ => 1,
        }
    }

    /// Payload length of a frame of this depth.
    pub const fn buffer_len(self, dim: Dimensions) -> usize {
        dim.surface() * self.bytes_per_pixel()
    }
}

impl TryFrom<u32> for BitDepth {
    type Error = DmdError;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            2 => Ok(BitDepth::Gray2),
            4 => Ok(BitDepth::Gray4),
            6 => Ok(BitDepth::Gray6),
            8 => Ok(BitDepth::Gray8),
            24 => Ok(BitDepth::Rgb24),
            other => Err(DmdError::UnsupportedBitDepth(other)),
        }
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> u32 {
        depth.bits()
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitDepth::Rgb24 => write!(f, "rgb24"),
            gray => write!(f, "gray{}", gray.bits()),
        }
    }
}

/// A single raster frame.
///
/// Gray frames store one unshifted sample per byte, RGB24 frames store
/// interleaved triplets. The payload length is always
/// `depth.buffer_len(dimensions)`; cloning shares the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    dim: Dimensions,
    depth: BitDepth,
    data: Bytes,
}

impl Frame {
    /// Wraps a payload, validating its length and, for gray depths, that
    /// every sample fits the depth.
    pub fn new(dim: Dimensions, depth: BitDepth, data: impl Into<Bytes>) -> Result<Self> {
        dim.validate()?;
        let data = data.into();
        let expected = depth.buffer_len(dim);
        if data.len() != expected {
            return Err(DmdError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        if depth.is_gray() && depth != BitDepth::Gray8 {
            let max = depth.num_colors();
            if let Some(pixel) = data.iter().position(|&s| s as usize >= max) {
                return Err(DmdError::Incompatible(format!(
                    "sample {} at pixel {} doesn't fit {}",
                    data[pixel], pixel, depth
                )));
            }
        }
        Ok(Self { dim, depth, data })
    }

    /// An all-black frame.
    pub fn blank(dim: Dimensions, depth: BitDepth) -> Result<Self> {
        Self::new(dim, depth, vec![0u8; depth.buffer_len(dim)])
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dim
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Same dimensions and depth, new payload.
    pub fn with_data(&self, data: impl Into<Bytes>) -> Result<Self> {
        Self::new(self.dim, self.depth, data)
    }

    /// Takes over dimensions, depth and payload of `other`.
    pub fn update(&mut self, other: &Frame) -> &mut Self {
        self.dim = other.dim;
        self.depth = other.depth;
        self.data = other.data.clone();
        self
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("dim", &self.dim)
            .field("depth", &self.depth)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Hex dump, one row per line. RGB24 frames are dumped channel by channel.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "DMD frame {}@{} ({} bytes):",
            self.dim,
            self.depth,
            self.data.len()
        )?;
        let width = self.dim.width as usize;
        match self.depth {
            BitDepth::Gray2 | BitDepth::Gray4 => {
                for row in self.data.chunks(width) {
                    for sample in row {
                        write!(f, "{:X}", sample)?;
                    }
                    writeln!(f)?;
                }
            }
            BitDepth::Gray6 | BitDepth::Gray8 => {
                for row in self.data.chunks(width) {
                    for sample in row {
                        write!(f, "{:02X} ", sample)?;
                    }
                    writeln!(f)?;
                }
            }
            BitDepth::Rgb24 => {
                for (channel, name) in ["RED", "GREEN", "BLUE"].iter().enumerate() {
                    writeln!(f, "::{}::", name)?;
                    for row in self.data.chunks(width * 3) {
                        for px in row.chunks(3) {
                            write!(f, "{:02X} ", px[channel])?;
                        }
                        writeln!(f)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(dim: Dimensions, depth: BitDepth, seed: u32) -> Frame {
        // xorshift, good enough to make two frames differ
        let mut state = seed.max(1);
        let data: Vec<u8> = (0..depth.buffer_len(dim))
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as usize % depth.num_colors().min(256)) as u8
            })
            .collect();
        Frame::new(dim, depth, data).unwrap()
    }

    #[test]
    fn bit_and_byte_length() {
        assert_eq!(bit_length(4), 2);
        assert_eq!(bit_length(16), 4);
        assert_eq!(bit_length(64), 6);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(5), 3);

        assert_eq!(byte_length(2), 1);
        assert_eq!(byte_length(4), 1);
        assert_eq!(byte_length(6), 1);
        assert_eq!(byte_length(24), 3);
    }

    #[test]
    fn payload_length_follows_depth() {
        let dim = Dimensions::new(128, 32);
        for depth in BitDepth::GRAY {
            assert_eq!(Frame::blank(dim, depth).unwrap().data().len(), 4096);
        }
        assert_eq!(
            Frame::blank(dim, BitDepth::Rgb24).unwrap().data().len(),
            12288
        );
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let dim = Dimensions::new(128, 32);
        let err = Frame::new(dim, BitDepth::Gray4, vec![0u8; 4095]).unwrap_err();
        assert!(matches!(
            err,
            DmdError::BufferLength {
                expected: 4096,
                actual: 4095
            }
        ));
        assert!(Frame::new(dim, BitDepth::Gray2, vec![4u8; 4096]).is_err());
        assert!(Frame::new(Dimensions::new(0, 32), BitDepth::Gray2, Vec::new()).is_err());
    }

    #[test]
    fn equality() {
        let dim = Dimensions::new(128, 32);
        let mut a = noise(dim, BitDepth::Gray4, 7);
        let b = noise(dim, BitDepth::Gray4, 1234);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        a.update(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn gray_and_rgb_frames_never_compare_equal() {
        let dim = Dimensions::new(8, 1);
        let gray = Frame::blank(dim, BitDepth::Gray8).unwrap();
        let rgb = Frame::blank(dim, BitDepth::Rgb24).unwrap();
        assert_ne!(gray, rgb);
    }

    #[test]
    fn depth_from_bits() {
        assert_eq!(BitDepth::try_from(6).unwrap(), BitDepth::Gray6);
        assert!(matches!(
            BitDepth::try_from(3),
            Err(DmdError::UnsupportedBitDepth(3))
        ));
        assert_eq!(BitDepth::Gray4.num_colors(), 16);
    }

    #[test]
    fn hex_dump() {
        let frame = Frame::new(Dimensions::new(4, 2), BitDepth::Gray4, vec![0, 1, 14, 15, 3, 3, 3, 3]).unwrap();
        let dump = frame.to_string();
        assert!(dump.contains("01EF\n3333\n"));
    }
}
