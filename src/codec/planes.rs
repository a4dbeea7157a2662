//! Bit-plane packing.
//!
//! Plane `p`, byte `k` holds bit `p` of pixels `8k..8k+8`, first pixel in
//! the least significant bit. This is the plane-serial layout gray panels
//! expect on the wire.

use crate::codec::diff_and_copy;
use crate::error::{DmdError, Result};
use crate::frame::Dimensions;

fn plane_size(dim: Dimensions) -> Result<usize> {
    dim.validate()?;
    if dim.surface() % 8 != 0 {
        return Err(DmdError::InvalidDimensions {
            dim,
            reason: "surface must be a multiple of 8 to pack bit planes",
        });
    }
    Ok(dim.surface() / 8)
}

/// Splits a one-sample-per-byte frame into `bits` planes.
pub fn split_into_planes(dim: Dimensions, bits: u32, frame: &[u8]) -> Result<Vec<Vec<u8>>> {
    let size = plane_size(dim)?;
    if !(1..=8).contains(&bits) {
        return Err(DmdError::UnsupportedBitDepth(bits));
    }
    if frame.len() != dim.surface() {
        return Err(DmdError::BufferLength {
            expected: dim.surface(),
            actual: frame.len(),
        });
    }
    if bits < 8 {
        if let Some(pixel) = frame.iter().position(|&s| s >> bits != 0) {
            return Err(DmdError::Incompatible(format!(
                "sample {} at pixel {} doesn't fit {} bits",
                frame[pixel], pixel, bits
            )));
        }
    }

    let bits = bits as usize;
    let mut planes = vec![vec![0u8; size]; bits];
    for (byte_idx, pixels) in frame.chunks_exact(8).enumerate() {
        for (shift, &pixel) in pixels.iter().enumerate() {
            for (bit, plane) in planes.iter_mut().enumerate() {
                plane[byte_idx] |= ((pixel >> bit) & 1) << shift;
            }
        }
    }
    Ok(planes)
}

/// Joins planes back into one sample per byte. Plane `i` becomes bit `i`.
pub fn merge_planes<P: AsRef<[u8]>>(dim: Dimensions, planes: &[P]) -> Result<Vec<u8>> {
    let size = plane_size(dim)?;
    if planes.is_empty() || planes.len() > 8 {
        return Err(DmdError::PlaneCount {
            expected: 8,
            actual: planes.len(),
        });
    }
    for plane in planes {
        if plane.as_ref().len() != size {
            return Err(DmdError::BufferLength {
                expected: size,
                actual: plane.as_ref().len(),
            });
        }
    }

    let mut frame = vec![0u8; dim.surface()];
    for (bit, plane) in planes.iter().enumerate() {
        for (byte_idx, &packed) in plane.as_ref().iter().enumerate() {
            let pixels = &mut frame[byte_idx * 8..byte_idx * 8 + 8];
            for (shift, pixel) in pixels.iter_mut().enumerate() {
                *pixel |= ((packed >> shift) & 1) << bit;
            }
        }
    }
    Ok(frame)
}

/// Cuts a flat run of concatenated planes into individual planes.
pub fn chunk_planes(dim: Dimensions, bits: u32, src: &[u8]) -> Result<Vec<Vec<u8>>> {
    let size = plane_size(dim)?;
    let expected = size * bits as usize;
    if src.len() != expected {
        return Err(DmdError::BufferLength {
            expected,
            actual: src.len(),
        });
    }
    Ok(src.chunks_exact(size).map(<[u8]>::to_vec).collect())
}

/// Writes planes back to back into `buffer` starting at `offset`.
///
/// Returns whether any byte of the buffer changed.
pub fn copy_planes<P: AsRef<[u8]>>(planes: &[P], buffer: &mut [u8], offset: usize) -> Result<bool> {
    let total: usize = planes.iter().map(|p| p.as_ref().len()).sum();
    if offset + total > buffer.len() {
        return Err(DmdError::BufferLength {
            expected: offset + total,
            actual: buffer.len(),
        });
    }
    let mut changed = false;
    let mut pos = offset;
    for plane in planes {
        let plane = plane.as_ref();
        changed |= diff_and_copy(plane, &mut buffer[pos..pos + plane.len()])?;
        pos += plane.len();
    }
    Ok(changed)
}
