use crate::codec;
use crate::error::Result;
use crate::frame::{BitDepth, Dimensions, DmdFrame, Frame};
use crate::pipeline::transform::{self, ResizeMode};

/// A pure frame transform run before the converter.
pub trait Processor: Send {
    fn name(&self) -> &str;

    /// Disabled processors are skipped.
    fn enabled(&self) -> bool {
        true
    }

    /// Returns the frame unchanged or a new one. No device I/O.
    fn process(&self, frame: DmdFrame) -> Result<DmdFrame>;
}

/// Resize and flip as a processor, for graphs that need the geometry
/// changed at a different point than the global pre-processing.
#[derive(Debug, Clone, Default)]
pub struct TransformProcessor {
    pub dimensions: Option<Dimensions>,
    pub mode: ResizeMode,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub disabled: bool,
}

impl Processor for TransformProcessor {
    fn name(&self) -> &str {
        "transform"
    }

    fn enabled(&self) -> bool {
        !self.disabled
    }

    fn process(&self, frame: DmdFrame) -> Result<DmdFrame> {
        let frame = match self.dimensions {
            Some(dim) => transform::resize_frame(&frame, dim, self.mode)?,
            None => frame,
        };
        transform::flip_frame(&frame, self.flip_horizontal, self.flip_vertical)
    }
}

/// Turns RGB24 frames into gray by luminosity, for screen grabs of
/// monochrome displays. Other frames pass through.
#[derive(Debug, Clone)]
pub struct MonochromeProcessor {
    depth: BitDepth,
}

impl MonochromeProcessor {
    pub fn new(depth: BitDepth) -> Self {
        Self { depth }
    }
}

impl Processor for MonochromeProcessor {
    fn name(&self) -> &str {
        "monochrome"
    }

    fn enabled(&self) -> bool {
        self.depth.is_gray()
    }

    fn process(&self, frame: DmdFrame) -> Result<DmdFrame> {
        match frame {
            DmdFrame::Rgb24(rgb) => {
                let gray = codec::rgb24_to_gray(rgb.data(), self.depth.num_colors())?;
                Ok(DmdFrame::Gray(Frame::new(rgb.dimensions(), self.depth, gray)?))
            }
            other => Ok(other),
        }
    }
}
