use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::info;

use crate::converter::Converter;
use crate::error::Result;
use crate::frame::{Color, ColoredFrame, DmdFrame, FrameFormat};

/// A converter that can be replaced while frames flow through it.
///
/// The active converter lives behind an atomic pointer: the render thread
/// loads it once per frame and sees either the old or the new converter,
/// never a mix. Without an active converter, or for frames it doesn't
/// accept, gray frames are colored with the fallback tint.
pub struct SwitchingConverter {
    active: ArcSwapOption<Box<dyn Converter>>,
    tint: ArcSwap<Color>,
}

impl SwitchingConverter {
    pub fn new(tint: Color) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            tint: ArcSwap::from_pointee(tint),
        }
    }

    /// Activates `converter`, returning the one it replaces.
    pub fn switch(&self, converter: Box<dyn Converter>) -> Option<Arc<Box<dyn Converter>>> {
        info!("Switching converter to {}", converter.name());
        self.active.swap(Some(Arc::new(converter)))
    }

    /// Falls back to the tint.
    pub fn reset(&self) -> Option<Arc<Box<dyn Converter>>> {
        self.active.swap(None)
    }

    pub fn set_tint(&self, color: Color) {
        self.tint.store(Arc::new(color));
    }

    pub fn tint(&self) -> Color {
        **self.tint.load()
    }

    pub fn active_name(&self) -> Option<String> {
        self.active.load_full().map(|c| c.name().to_string())
    }
}

impl Converter for SwitchingConverter {
    fn name(&self) -> &str {
        "switching"
    }

    fn accepts(&self, format: FrameFormat) -> bool {
        match format {
            FrameFormat::Gray(_) => true,
            other => self.active.load_full().is_some_and(|c| c.accepts(other)),
        }
    }

    fn convert(&self, frame: &DmdFrame) -> Result<DmdFrame> {
        let active = self.active.load_full();
        if let Some(converter) = active.as_ref().filter(|c| c.accepts(frame.format())) {
            return converter.convert(frame);
        }
        match frame {
            DmdFrame::Gray(gray) => Ok(DmdFrame::Colored(ColoredFrame::from_color(
                gray.clone(),
                self.tint(),
            )?)),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::PaletteColorizer;
    use crate::frame::{BitDepth, Dimensions, Frame};

    fn gray2() -> DmdFrame {
        DmdFrame::Gray(Frame::new(Dimensions::new(4, 1), BitDepth::Gray2, vec![0, 1, 2, 3]).unwrap())
    }

    #[test]
    fn tints_without_active_converter() {
        let switching = SwitchingConverter::new(Color::RED);
        let DmdFrame::Colored(colored) = switching.convert(&gray2()).unwrap() else {
            panic!("expected a colored frame");
        };
        assert_eq!(colored.palette()[3], Color::RED);
        assert_eq!(colored.palette()[0], Color::BLACK);
        assert!(switching.active_name().is_none());
    }

    #[test]
    fn hot_swap() {
        let switching = SwitchingConverter::new(Color::RED);
        let palette = [Color::BLACK, Color::BLUE, Color::BLUE, Color::WHITE];
        let previous = switching.switch(Box::new(PaletteColorizer::new("afm", &palette).unwrap()));
        assert!(previous.is_none());
        assert_eq!(switching.active_name().as_deref(), Some("afm"));

        let DmdFrame::Colored(colored) = switching.convert(&gray2()).unwrap() else {
            panic!("expected a colored frame");
        };
        assert_eq!(colored.palette()[1], Color::BLUE);

        let previous = switching.reset().unwrap();
        assert_eq!(previous.name(), "afm");
        switching.set_tint(Color::WHITE);
        let DmdFrame::Colored(colored) = switching.convert(&gray2()).unwrap() else {
            panic!("expected a colored frame");
        };
        assert_eq!(colored.palette()[3], Color::WHITE);
    }

    #[test]
    fn swaps_from_other_threads() {
        let switching = Arc::new(SwitchingConverter::new(Color::RED));
        let palette = [Color::BLACK, Color::BLUE];
        let writer = {
            let switching = switching.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let colorizer = PaletteColorizer::new(format!("game{}", i), &palette).unwrap();
                    switching.switch(Box::new(colorizer));
                }
            })
        };
        for _ in 0..100 {
            let DmdFrame::Colored(colored) = switching.convert(&gray2()).unwrap() else {
                panic!("expected a colored frame");
            };
            let last = colored.palette()[3];
            assert!(last == Color::RED || last == Color::BLUE);
        }
        writer.join().unwrap();
        assert_eq!(switching.active_name().as_deref(), Some("game99"));
    }
}
