//! Palette expansion and RGB packing.

use serde::{Deserialize, Serialize};

use crate::error::{DmdError, Result};
use crate::frame::Color;

/// Channel wiring of an RGB LED matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
}

fn check_rgb24(rgb: &[u8]) -> Result<()> {
    if rgb.len() % 3 != 0 {
        return Err(DmdError::BufferLength {
            expected: rgb.len() / 3 * 3,
            actual: rgb.len(),
        });
    }
    Ok(())
}

/// Looks every sample up in `palette` and emits RGB24 triplets.
pub fn apply_palette(frame: &[u8], palette: &[Color]) -> Result<Vec<u8>> {
    if let Some(pixel) = frame.iter().position(|&s| s as usize >= palette.len()) {
        return Err(DmdError::PaletteIndex {
            sample: frame[pixel],
            pixel,
            len: palette.len(),
        });
    }
    let mut rgb = Vec::with_capacity(frame.len() * 3);
    for &sample in frame {
        let color = palette[sample as usize];
        rgb.extend_from_slice(&[color.r, color.g, color.b]);
    }
    Ok(rgb)
}

/// Packs one pixel as RGB565, high byte first.
#[inline]
pub fn pack_rgb565(r: u8, g: u8, b: u8) -> [u8; 2] {
    [(r & 0xf8) | (g >> 5), ((g & 0x1c) << 3) | (b >> 3)]
}

/// RGB24 to RGB565, two bytes per pixel, high byte first.
pub fn convert_rgb24_to_rgb565(rgb: &[u8]) -> Result<Vec<u8>> {
    check_rgb24(rgb)?;
    Ok(rgb
        .chunks_exact(3)
        .flat_map(|px| pack_rgb565(px[0], px[1], px[2]))
        .collect())
}

/// RGB24 to one 16-bit RGB565 word per pixel.
pub fn convert_rgb24_to_rgb565_words(rgb: &[u8]) -> Result<Vec<u16>> {
    check_rgb24(rgb)?;
    Ok(rgb
        .chunks_exact(3)
        .map(|px| u16::from_be_bytes(pack_rgb565(px[0], px[1], px[2])))
        .collect())
}

/// RGB565 (high byte first) back to RGB24. The top bits of each channel are
/// replicated into the low bits so full intensity stays at 0xFF.
pub fn convert_rgb565_to_rgb24(rgb565: &[u8]) -> Result<Vec<u8>> {
    if rgb565.len() % 2 != 0 {
        return Err(DmdError::BufferLength {
            expected: rgb565.len() + 1,
            actual: rgb565.len(),
        });
    }
    Ok(rgb565
        .chunks_exact(2)
        .flat_map(|px| {
            let word = u16::from_be_bytes([px[0], px[1]]);
            let r = ((word >> 8) & 0xf8) as u8;
            let g = ((word >> 3) & 0xfc) as u8;
            let b = ((word << 3) & 0xf8) as u8;
            [r | r >> 5, g | g >> 6, b | b >> 5]
        })
        .collect())
}

/// Quantizes RGB24 to `shades` gray levels by HSL luminosity.
pub fn rgb24_to_gray(rgb: &[u8], shades: usize) -> Result<Vec<u8>> {
    check_rgb24(rgb)?;
    if !(2..=256).contains(&shades) {
        return Err(DmdError::Incompatible(format!(
            "cannot quantize to {} shades",
            shades
        )));
    }
    let top = (shades - 1) as f64;
    Ok(rgb
        .chunks_exact(3)
        .map(|px| {
            let max = px[0].max(px[1]).max(px[2]) as f64;
            let min = px[0].min(px[1]).min(px[2]) as f64;
            let luminosity = (max + min) / 2.0 / 255.0;
            (luminosity * top).round().clamp(0.0, top) as u8
        })
        .collect())
}

const PAIR_OFFSET: usize = 16;
const MATRIX_SIZE: usize = 32;

/// Serializes RGB565 pixels into the sub-frame layout of chained 32x32
/// HUB75 panels driven through shift registers.
///
/// Each output byte is a dot pair: a pixel and the pixel 16 rows below it,
/// one bit per channel (`r0 g0 b0 r1 g1 b1`, MSB first). Three sub-frames
/// carry the three most significant bits of every channel, least
/// significant of those first.
pub fn split_into_rgb_planes(
    rgb565: &[u16],
    width: u32,
    num_logical_rows: u32,
    order: ColorOrder,
) -> Result<Vec<u8>> {
    let width = width as usize;
    let rows = num_logical_rows as usize;
    if width == 0 || width % MATRIX_SIZE != 0 || rgb565.len() % width != 0 {
        return Err(DmdError::Incompatible(format!(
            "{} pixels don't tile {}-wide 32x32 matrices",
            rgb565.len(),
            width
        )));
    }
    let height = rgb565.len() / width;
    if height == 0 || height % MATRIX_SIZE != 0 {
        return Err(DmdError::Incompatible(format!(
            "height {} is not a multiple of 32",
            height
        )));
    }
    if rows == 0 || rows > PAIR_OFFSET || (MATRIX_SIZE * MATRIX_SIZE / 2) % rows != 0 {
        return Err(DmdError::Incompatible(format!(
            "unsupported number of logical rows: {}",
            rows
        )));
    }

    let subframe_size = rgb565.len() / 2;
    let mut dest = vec![0u8; subframe_size * 3];
    let layout = MatrixLayout::new(width, height, rows);

    for x in 0..width {
        for y in 0..height {
            if y % (PAIR_OFFSET * 2) >= PAIR_OFFSET {
                continue;
            }
            let (mut r0, mut g0, mut b0) = top_bits(rgb565[y * width + x], order);
            let (mut r1, mut g1, mut b1) = top_bits(rgb565[(y + PAIR_OFFSET) * width + x], order);
            let index = layout.index(x, y);

            for subframe in 0..3 {
                let dot_pair = (r0 & 1) << 5
                    | (g0 & 1) << 4
                    | (b0 & 1) << 3
                    | (r1 & 1) << 2
                    | (g1 & 1) << 1
                    | (b1 & 1);
                dest[subframe * subframe_size + index] = dot_pair;
                r0 >>= 1;
                g0 >>= 1;
                b0 >>= 1;
                r1 >>= 1;
                g1 >>= 1;
                b1 >>= 1;
            }
        }
    }
    Ok(dest)
}

/// Three most significant bits of each channel, as wired.
fn top_bits(color: u16, order: ColorOrder) -> (u8, u8, u8) {
    let hi = ((color >> 13) & 0x7) as u8;
    let mid = ((color >> 8) & 0x7) as u8;
    let lo = ((color >> 2) & 0x7) as u8;
    match order {
        ColorOrder::Rgb => (hi, mid, lo),
        ColorOrder::Rbg => (hi, lo, mid),
    }
}

struct MatrixLayout {
    rows: usize,
    row_len_per_matrix: usize,
    dot_pairs_per_row: usize,
    width_in_matrices: usize,
    total_matrices: usize,
}

impl MatrixLayout {
    fn new(width: usize, height: usize, rows: usize) -> Self {
        Self {
            rows,
            row_len_per_matrix: MATRIX_SIZE * MATRIX_SIZE / 2 / rows,
            dot_pairs_per_row: width * height / rows / 2,
            width_in_matrices: width / MATRIX_SIZE,
            total_matrices: width * height / (MATRIX_SIZE * MATRIX_SIZE),
        }
    }

    /// Position of the dot pair at `(x, y)` within a sub-frame. Matrices
    /// are chained bottom row first.
    fn index(&self, x: usize, y: usize) -> usize {
        let logical_row = y % self.rows;
        let matrix_x = x / MATRIX_SIZE;
        let matrix_y = y / MATRIX_SIZE;
        let matrix_number = self.total_matrices - (matrix_y + 1) * self.width_in_matrices + matrix_x;
        logical_row * self.dot_pairs_per_row
            + matrix_number * self.row_len_per_matrix
            + x % self.row_len_per_matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_lookup() {
        let palette = [Color::BLACK, Color::rgb(1, 2, 3), Color::rgb(4, 5, 6), Color::WHITE];
        let frame = [3u8, 0, 2, 1];
        let rgb = apply_palette(&frame, &palette).unwrap();
        assert_eq!(rgb.len(), 12);
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0, 4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn palette_lookup_fails_out_of_range() {
        let err = apply_palette(&[0, 1, 2], &[Color::BLACK, Color::WHITE]).unwrap_err();
        assert!(matches!(
            err,
            DmdError::PaletteIndex {
                sample: 2,
                pixel: 2,
                len: 2
            }
        ));
    }

    #[test]
    fn rgb565_packing() {
        assert_eq!(pack_rgb565(0xff, 0xff, 0xff), [0xff, 0xff]);
        assert_eq!(pack_rgb565(0xff, 0, 0), [0xf8, 0x00]);
        assert_eq!(pack_rgb565(0, 0xff, 0), [0x07, 0xe0]);
        assert_eq!(pack_rgb565(0, 0, 0xff), [0x00, 0x1f]);

        let rgb = [0xff, 0, 0, 0, 0, 0xff];
        assert_eq!(convert_rgb24_to_rgb565(&rgb).unwrap(), vec![0xf8, 0x00, 0x00, 0x1f]);
        assert_eq!(convert_rgb24_to_rgb565_words(&rgb).unwrap(), vec![0xf800, 0x001f]);
        assert!(convert_rgb24_to_rgb565(&[0, 0]).is_err());
    }

    #[test]
    fn rgb565_expansion_keeps_extremes() {
        let rgb = [0xff, 0xff, 0xff, 0, 0, 0, 0xff, 0, 0];
        let packed = convert_rgb24_to_rgb565(&rgb).unwrap();
        assert_eq!(convert_rgb565_to_rgb24(&packed).unwrap(), rgb.to_vec());
    }

    #[test]
    fn luminosity_quantization() {
        let rgb = [0, 0, 0, 255, 255, 255, 255, 0, 0];
        assert_eq!(rgb24_to_gray(&rgb, 4).unwrap(), vec![0, 3, 2]);
        assert_eq!(rgb24_to_gray(&rgb, 16).unwrap(), vec![0, 15, 8]);
    }

    #[test]
    fn rgb_planes_layout() {
        let width = 32u32;
        let mut pixels = vec![0u16; 32 * 32];
        // full red top-left, full blue on its pair partner 16 rows below
        pixels[0] = 0xf800;
        pixels[16 * 32] = 0x001f;
        let planes = split_into_rgb_planes(&pixels, width, 16, ColorOrder::Rgb).unwrap();
        assert_eq!(planes.len(), 32 * 32 / 2 * 3);

        let subframe = 32 * 32 / 2;
        for s in 0..3 {
            assert_eq!(planes[s * subframe], 0b100_001, "subframe {}", s);
        }
        assert_eq!(planes.iter().filter(|&&b| b != 0).count(), 3);
    }

    #[test]
    fn rgb_planes_channel_order() {
        let mut pixels = vec![0u16; 32 * 32];
        // pure green
        pixels[0] = 0x07e0;
        let rgb = split_into_rgb_planes(&pixels, 32, 16, ColorOrder::Rgb).unwrap();
        let rbg = split_into_rgb_planes(&pixels, 32, 16, ColorOrder::Rbg).unwrap();
        assert_eq!(rgb[0], 0b010_000);
        assert_eq!(rbg[0], 0b001_000);
    }

    #[test]
    fn rgb_planes_reject_odd_geometry() {
        assert!(split_into_rgb_planes(&[0u16; 48 * 32], 48, 16, ColorOrder::Rgb).is_err());
        assert!(split_into_rgb_planes(&[0u16; 32 * 16], 32, 16, ColorOrder::Rgb).is_err());
        assert!(split_into_rgb_planes(&[0u16; 32 * 32], 32, 3, ColorOrder::Rgb).is_err());
    }
}
