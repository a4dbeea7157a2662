use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::converter::Converter;
use crate::error::{DmdError, Result};
use crate::frame::palette::fit_palette;
use crate::frame::{BitDepth, Color, ColoredFrame, DmdFrame, FrameFormat};

/// Static colorization: every gray frame gets the same palette, fitted to
/// its depth.
pub struct PaletteColorizer {
    name: String,
    fitted: HashMap<BitDepth, Arc<[Color]>>,
}

impl PaletteColorizer {
    /// Fits `palette` once for 2, 4 and 6 bit frames.
    pub fn new(name: impl Into<String>, palette: &[Color]) -> Result<Self> {
        let name = name.into();
        let mut fitted = HashMap::new();
        for depth in [BitDepth::Gray2, BitDepth::Gray4, BitDepth::Gray6] {
            let colors = fit_palette(palette, depth.num_colors())?;
            fitted.insert(depth, Arc::from(colors));
        }
        debug!(
            "Colorizer {} prepared from {} colors",
            name,
            palette.len()
        );
        Ok(Self { name, fitted })
    }

    pub fn palette(&self, depth: BitDepth) -> Option<&[Color]> {
        self.fitted.get(&depth).map(|p| &p[..])
    }
}

impl Converter for PaletteColorizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, format: FrameFormat) -> bool {
        matches!(format, FrameFormat::Gray(depth) if self.fitted.contains_key(&depth))
    }

    fn convert(&self, frame: &DmdFrame) -> Result<DmdFrame> {
        let DmdFrame::Gray(gray) = frame else {
            return Err(DmdError::Incompatible(format!(
                "{} only colors gray frames, got {}",
                self.name,
                frame.format()
            )));
        };
        let palette = self.fitted.get(&gray.depth()).ok_or_else(|| {
            DmdError::Incompatible(format!("{} has no palette for {}", self.name, gray.depth()))
        })?;
        Ok(DmdFrame::Colored(ColoredFrame::new(
            gray.clone(),
            palette.clone(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Dimensions, Frame};

    #[test]
    fn colors_gray_frames() {
        let palette = [Color::BLACK, Color::BLUE, Color::RED, Color::WHITE];
        let colorizer = PaletteColorizer::new("test", &palette).unwrap();
        assert!(colorizer.accepts(FrameFormat::Gray(BitDepth::Gray2)));
        assert!(!colorizer.accepts(FrameFormat::Rgb24));
        assert!(!colorizer.accepts(FrameFormat::Colored(BitDepth::Gray2)));
        assert_eq!(colorizer.palette(BitDepth::Gray4).unwrap().len(), 16);

        let frame = Frame::new(Dimensions::new(4, 1), BitDepth::Gray2, vec![0, 1, 2, 3]).unwrap();
        let DmdFrame::Colored(colored) = colorizer.convert(&DmdFrame::Gray(frame)).unwrap() else {
            panic!("expected a colored frame");
        };
        assert_eq!(colored.palette(), &palette[..]);
    }

    #[test]
    fn rejects_single_color_palettes() {
        assert!(PaletteColorizer::new("mono", &[Color::RED]).is_err());
    }
}
