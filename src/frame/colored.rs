use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::error::{DmdError, Result};
use crate::frame::{palette, BitDepth, Color, Dimensions, Frame};

/// A gray frame rendered through a palette of exactly `2^depth` colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredFrame {
    frame: Frame,
    palette: Arc<[Color]>,
}

impl ColoredFrame {
    pub fn new(frame: Frame, palette: impl Into<Arc<[Color]>>) -> Result<Self> {
        let palette = palette.into();
        if !frame.depth().is_gray() {
            return Err(DmdError::Incompatible(format!(
                "cannot attach a palette to a {} frame",
                frame.depth()
            )));
        }
        let expected = frame.depth().num_colors();
        if palette.len() != expected {
            return Err(DmdError::PaletteLength {
                expected,
                actual: palette.len(),
            });
        }
        Ok(Self { frame, palette })
    }

    /// Colors the frame with a black-to-`color` ramp.
    pub fn from_color(frame: Frame, color: Color) -> Result<Self> {
        let ramp = palette::gradient(color, frame.depth().num_colors());
        Self::new(frame, ramp)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    pub fn shared_palette(&self) -> Arc<[Color]> {
        self.palette.clone()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.frame.dimensions()
    }

    pub fn depth(&self) -> BitDepth {
        self.frame.depth()
    }

    /// Same palette, different pixels.
    pub fn with_frame(&self, frame: Frame) -> Result<Self> {
        Self::new(frame, self.palette.clone())
    }

    /// Expands to RGB24 by looking every sample up in the palette.
    pub fn to_rgb24(&self) -> Result<Frame> {
        let rgb = codec::apply_palette(self.frame.data(), &self.palette)?;
        Frame::new(self.dimensions(), BitDepth::Rgb24, rgb)
    }
}

/// Representation of a frame as it travels through the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    Gray(BitDepth),
    Colored(BitDepth),
    Rgb24,
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFormat::Gray(depth) => write!(f, "{}", depth),
            FrameFormat::Colored(depth) => write!(f, "colored {}", depth),
            FrameFormat::Rgb24 => write!(f, "rgb24"),
        }
    }
}

/// A frame in one of the representations the graph routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmdFrame {
    Gray(Frame),
    Colored(ColoredFrame),
    Rgb24(Frame),
}

impl DmdFrame {
    pub fn dimensions(&self) -> Dimensions {
        match self {
            DmdFrame::Gray(f) | DmdFrame::Rgb24(f) => f.dimensions(),
            DmdFrame::Colored(f) => f.dimensions(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        match self {
            DmdFrame::Gray(f) => FrameFormat::Gray(f.depth()),
            DmdFrame::Colored(f) => FrameFormat::Colored(f.depth()),
            DmdFrame::Rgb24(_) => FrameFormat::Rgb24,
        }
    }

    /// The pixel payload without any palette.
    pub fn raster(&self) -> &Frame {
        match self {
            DmdFrame::Gray(f) | DmdFrame::Rgb24(f) => f,
            DmdFrame::Colored(f) => f.frame(),
        }
    }

    /// Replaces the pixels, keeping format and palette.
    pub fn map_raster(&self, raster: Frame) -> Result<DmdFrame> {
        match self {
            DmdFrame::Gray(_) => Ok(DmdFrame::Gray(raster)),
            DmdFrame::Rgb24(_) => Ok(DmdFrame::Rgb24(raster)),
            DmdFrame::Colored(f) => Ok(DmdFrame::Colored(f.with_frame(raster)?)),
        }
    }
}

impl From<Frame> for DmdFrame {
    fn from(frame: Frame) -> Self {
        if frame.depth().is_gray() {
            DmdFrame::Gray(frame)
        } else {
            DmdFrame::Rgb24(frame)
        }
    }
}

impl From<ColoredFrame> for DmdFrame {
    fn from(frame: ColoredFrame) -> Self {
        DmdFrame::Colored(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray2() -> Frame {
        Frame::new(Dimensions::new(4, 1), BitDepth::Gray2, vec![0, 1, 2, 3]).unwrap()
    }

    #[test]
    fn palette_must_match_depth() {
        let err = ColoredFrame::new(gray2(), vec![Color::BLACK; 16]).unwrap_err();
        assert!(matches!(
            err,
            DmdError::PaletteLength {
                expected: 4,
                actual: 16
            }
        ));
        assert!(ColoredFrame::new(gray2(), vec![Color::BLACK; 4]).is_ok());
    }

    #[test]
    fn rgb_frames_take_no_palette() {
        let rgb = Frame::blank(Dimensions::new(4, 1), BitDepth::Rgb24).unwrap();
        assert!(ColoredFrame::new(rgb, vec![Color::BLACK; 4]).is_err());
    }

    #[test]
    fn expands_to_rgb24() {
        let palette = vec![Color::BLACK, Color::RED, Color::BLUE, Color::WHITE];
        let colored = ColoredFrame::new(gray2(), palette).unwrap();
        let rgb = colored.to_rgb24().unwrap();
        assert_eq!(rgb.depth(), BitDepth::Rgb24);
        assert_eq!(
            rgb.data(),
            &[0, 0, 0, 255, 0, 0, 0, 0, 255, 255, 255, 255][..]
        );
    }

    #[test]
    fn frame_format_follows_variant() {
        assert_eq!(DmdFrame::from(gray2()).format(), FrameFormat::Gray(BitDepth::Gray2));
        let colored = ColoredFrame::from_color(gray2(), Color::RED).unwrap();
        assert_eq!(
            DmdFrame::from(colored).format(),
            FrameFormat::Colored(BitDepth::Gray2)
        );
        let rgb = Frame::blank(Dimensions::new(4, 1), BitDepth::Rgb24).unwrap();
        assert_eq!(DmdFrame::from(rgb).format(), FrameFormat::Rgb24);
    }
}
