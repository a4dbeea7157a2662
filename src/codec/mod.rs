//! Pixel format conversions shared by converters and destinations.

pub mod color;
pub mod planes;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{DmdError, Result};
use crate::frame::BitDepth;

pub use color::{
    apply_palette, convert_rgb24_to_rgb565, convert_rgb24_to_rgb565_words, convert_rgb565_to_rgb24,
    rgb24_to_gray, split_into_rgb_planes, ColorOrder,
};
pub use planes::{chunk_planes, copy_planes, merge_planes, split_into_planes};

/// The shades a 4-bit panel uses to show 2-bit content.
pub const GRAY2_TO_GRAY4: [u8; 4] = [0x0, 0x1, 0x4, 0xf];

static GRAY_TABLES: Lazy<HashMap<(BitDepth, BitDepth), Vec<u8>>> = Lazy::new(|| {
    let mut tables = HashMap::new();
    for from in BitDepth::GRAY {
        for to in BitDepth::GRAY {
            if from == to {
                continue;
            }
            let table = if from == BitDepth::Gray2 && to == BitDepth::Gray4 {
                GRAY2_TO_GRAY4.to_vec()
            } else if from.bits() > to.bits() {
                let shift = from.bits() - to.bits();
                (0..from.num_colors()).map(|v| (v >> shift) as u8).collect()
            } else {
                let top_from = from.num_colors() - 1;
                let top_to = to.num_colors() - 1;
                (0..from.num_colors())
                    .map(|v| ((v * top_to + top_from / 2) / top_from) as u8)
                    .collect()
            };
            tables.insert((from, to), table);
        }
    }
    tables
});

/// Built-in lookup table between two gray depths.
///
/// Downscaling drops the low bits. Upscaling spreads the range evenly, except
/// 2 to 4 bits which uses [`GRAY2_TO_GRAY4`].
pub fn gray_lut(from: BitDepth, to: BitDepth) -> Option<&'static [u8]> {
    GRAY_TABLES.get(&(from, to)).map(Vec::as_slice)
}

/// Maps every sample through `lut`.
pub fn remap_gray(frame: &[u8], lut: &[u8]) -> Result<Vec<u8>> {
    frame
        .iter()
        .enumerate()
        .map(|(pixel, &sample)| {
            lut.get(sample as usize).copied().ok_or(DmdError::LookupIndex {
                sample,
                pixel,
                len: lut.len(),
            })
        })
        .collect()
}

/// Copies `new` over `existing` and reports whether anything changed.
///
/// Destinations use this to skip writing identical frames to the wire.
pub fn diff_and_copy(new: &[u8], existing: &mut [u8]) -> Result<bool> {
    if new.len() != existing.len() {
        return Err(DmdError::BufferLength {
            expected: existing.len(),
            actual: new.len(),
        });
    }
    if new == existing {
        return Ok(false);
    }
    existing.copy_from_slice(new);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_tables() {
        assert_eq!(gray_lut(BitDepth::Gray2, BitDepth::Gray4).unwrap(), &[0, 1, 4, 15]);
        assert_eq!(gray_lut(BitDepth::Gray4, BitDepth::Gray2).unwrap()[15], 3);
        assert_eq!(gray_lut(BitDepth::Gray4, BitDepth::Gray2).unwrap()[7], 1);
        assert_eq!(gray_lut(BitDepth::Gray8, BitDepth::Gray4).unwrap()[0xff], 0xf);

        let up = gray_lut(BitDepth::Gray4, BitDepth::Gray8).unwrap();
        assert_eq!(up[0], 0);
        assert_eq!(up[15], 255);
        assert_eq!(up[1], 17);

        assert!(gray_lut(BitDepth::Gray4, BitDepth::Gray4).is_none());
        assert!(gray_lut(BitDepth::Gray4, BitDepth::Rgb24).is_none());
    }

    #[test]
    fn remap_checks_range() {
        assert_eq!(remap_gray(&[0, 3, 2], &GRAY2_TO_GRAY4).unwrap(), vec![0, 15, 4]);
        let err = remap_gray(&[0, 4], &GRAY2_TO_GRAY4).unwrap_err();
        assert!(matches!(
            err,
            DmdError::LookupIndex {
                sample: 4,
                pixel: 1,
                len: 4
            }
        ));
    }

    #[test]
    fn diff_and_copy_detects_changes() {
        let mut existing = vec![1u8, 2, 3];
        assert!(!diff_and_copy(&[1, 2, 3], &mut existing).unwrap());
        assert!(diff_and_copy(&[1, 2, 4], &mut existing).unwrap());
        assert_eq!(existing, vec![1, 2, 4]);
        assert!(diff_and_copy(&[1, 2], &mut existing).is_err());
    }
}
