//! Geometric transforms applied before dispatch.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::{Dimensions, DmdFrame, Frame};

/// Sampling used when a frame is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    #[default]
    Nearest,
    Bilinear,
}

/// Scales `frame` to `dim`. Same-size frames are returned as is.
pub fn resize(frame: &Frame, dim: Dimensions, mode: ResizeMode) -> Result<Frame> {
    dim.validate()?;
    let src = frame.dimensions();
    if src == dim {
        return Ok(frame.clone());
    }
    let bpp = frame.depth().bytes_per_pixel();
    let data = match mode {
        ResizeMode::Nearest => nearest(frame.data(), src, dim, bpp),
        ResizeMode::Bilinear => bilinear(frame.data(), src, dim, bpp),
    };
    Frame::new(dim, frame.depth(), data)
}

fn nearest(data: &[u8], src: Dimensions, dst: Dimensions, bpp: usize) -> Vec<u8> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let (dw, dh) = (dst.width as usize, dst.height as usize);
    let mut out = Vec::with_capacity(dw * dh * bpp);
    for y in 0..dh {
        let sy = y * sh / dh;
        for x in 0..dw {
            let sx = x * sw / dw;
            let i = (sy * sw + sx) * bpp;
            out.extend_from_slice(&data[i..i + bpp]);
        }
    }
    out
}

fn bilinear(data: &[u8], src: Dimensions, dst: Dimensions, bpp: usize) -> Vec<u8> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let (dw, dh) = (dst.width as usize, dst.height as usize);
    // maps an output coordinate to the two source samples around it
    let axis = |pos: usize, from: usize, to: usize| {
        let f = ((pos as f32 + 0.5) * from as f32 / to as f32 - 0.5).max(0.0);
        let lo = (f.floor() as usize).min(from - 1);
        let hi = (lo + 1).min(from - 1);
        (lo, hi, f - lo as f32)
    };

    let mut out = Vec::with_capacity(dw * dh * bpp);
    for y in 0..dh {
        let (y0, y1, ty) = axis(y, sh, dh);
        for x in 0..dw {
            let (x0, x1, tx) = axis(x, sw, dw);
            for c in 0..bpp {
                let at = |sx: usize, sy: usize| data[(sy * sw + sx) * bpp + c] as f32;
                let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
                let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
                out.push((top * (1.0 - ty) + bottom * ty).round() as u8);
            }
        }
    }
    out
}

/// Mirrors `frame` around the requested axes.
pub fn flip(frame: &Frame, horizontal: bool, vertical: bool) -> Result<Frame> {
    if !horizontal && !vertical {
        return Ok(frame.clone());
    }
    let dim = frame.dimensions();
    let (w, h) = (dim.width as usize, dim.height as usize);
    let bpp = frame.depth().bytes_per_pixel();
    let data = frame.data();
    let mut out = Vec::with_capacity(data.len());
    for y in 0..h {
        let sy = if vertical { h - 1 - y } else { y };
        for x in 0..w {
            let sx = if horizontal { w - 1 - x } else { x };
            let i = (sy * w + sx) * bpp;
            out.extend_from_slice(&data[i..i + bpp]);
        }
    }
    frame.with_data(out)
}

/// [`resize`] for any frame representation, keeping its palette.
pub fn resize_frame(frame: &DmdFrame, dim: Dimensions, mode: ResizeMode) -> Result<DmdFrame> {
    if frame.dimensions() == dim {
        return Ok(frame.clone());
    }
    frame.map_raster(resize(frame.raster(), dim, mode)?)
}

/// [`flip`] for any frame representation, keeping its palette.
pub fn flip_frame(frame: &DmdFrame, horizontal: bool, vertical: bool) -> Result<DmdFrame> {
    if !horizontal && !vertical {
        return Ok(frame.clone());
    }
    frame.map_raster(flip(frame.raster(), horizontal, vertical)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BitDepth;

    fn gray4(w: u32, h: u32, data: Vec<u8>) -> Frame {
        Frame::new(Dimensions::new(w, h), BitDepth::Gray4, data).unwrap()
    }

    #[test]
    fn nearest_doubles_pixels() {
        let frame = gray4(2, 1, vec![1, 2]);
        let big = resize(&frame, Dimensions::new(4, 2), ResizeMode::Nearest).unwrap();
        assert_eq!(big.data(), &[1, 1, 2, 2, 1, 1, 2, 2][..]);
        let back = resize(&big, Dimensions::new(2, 1), ResizeMode::Nearest).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn bilinear_blends_neighbors() {
        let frame = gray4(2, 1, vec![0, 15]);
        let wide = resize(&frame, Dimensions::new(4, 1), ResizeMode::Bilinear).unwrap();
        assert_eq!(wide.data()[0], 0);
        assert_eq!(wide.data()[3], 15);
        assert!(wide.data()[1] > 0 && wide.data()[1] < wide.data()[2]);

        let uniform = gray4(3, 3, vec![7; 9]);
        let scaled = resize(&uniform, Dimensions::new(5, 2), ResizeMode::Bilinear).unwrap();
        assert!(scaled.data().iter().all(|&v| v == 7));
    }

    #[test]
    fn resizes_rgb_triplets() {
        let frame = Frame::new(Dimensions::new(1, 1), BitDepth::Rgb24, vec![1, 2, 3]).unwrap();
        let big = resize(&frame, Dimensions::new(2, 1), ResizeMode::Nearest).unwrap();
        assert_eq!(big.data(), &[1, 2, 3, 1, 2, 3][..]);
    }

    #[test]
    fn flips() {
        let frame = gray4(3, 2, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(flip(&frame, true, false).unwrap().data(), &[3, 2, 1, 6, 5, 4][..]);
        assert_eq!(flip(&frame, false, true).unwrap().data(), &[4, 5, 6, 1, 2, 3][..]);
        assert_eq!(flip(&frame, true, true).unwrap().data(), &[6, 5, 4, 3, 2, 1][..]);
        assert_eq!(flip(&frame, false, false).unwrap(), frame);
    }
}
