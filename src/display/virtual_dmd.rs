//! In-memory display a GUI host can paint from.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::capability::{Capabilities, FrameKinds};
use crate::codec;
use crate::display::Destination;
use crate::error::{DmdError, Result};
use crate::frame::palette::{fit_palette, gradient};
use crate::frame::{BitDepth, Color, DmdFrame, Frame};

struct Screen {
    default_color: Color,
    color: Color,
    palette: Option<Vec<Color>>,
    frame: Option<Frame>,
    frames_rendered: u64,
    disposed: bool,
}

/// Renders everything to an RGB24 framebuffer.
///
/// Gray frames are colored with the palette or tint set through the hooks.
pub struct VirtualDmd {
    name: String,
    capabilities: Capabilities,
    screen: Arc<RwLock<Screen>>,
}

/// Read side of a [`VirtualDmd`], handed to whatever paints it.
#[derive(Clone)]
pub struct VirtualDmdView {
    screen: Arc<RwLock<Screen>>,
}

impl VirtualDmd {
    pub fn new(name: impl Into<String>, color: Color) -> (Self, VirtualDmdView) {
        let screen = Arc::new(RwLock::new(Screen {
            default_color: color,
            color,
            palette: None,
            frame: None,
            frames_rendered: 0,
            disposed: false,
        }));
        let dmd = Self {
            name: name.into(),
            capabilities: Capabilities::new(FrameKinds::ALL_GRAY | FrameKinds::ALL_COLORED | FrameKinds::RGB24),
            screen: screen.clone(),
        };
        (dmd, VirtualDmdView { screen })
    }

    fn colors_for(screen: &Screen, depth: BitDepth) -> Result<Vec<Color>> {
        match &screen.palette {
            Some(palette) => fit_palette(palette, depth.num_colors()),
            None => Ok(gradient(screen.color, depth.num_colors())),
        }
    }
}

impl Destination for VirtualDmd {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn render(&self, frame: &DmdFrame) -> Result<()> {
        let mut screen = self.screen.write();
        if screen.disposed {
            return Err(DmdError::Disposed(self.name.clone()));
        }
        let rgb = match frame {
            DmdFrame::Gray(gray) => {
                let colors = Self::colors_for(&screen, gray.depth())?;
                let data = codec::apply_palette(gray.data(), &colors)?;
                Frame::new(gray.dimensions(), BitDepth::Rgb24, data)?
            }
            DmdFrame::Colored(colored) => colored.to_rgb24()?,
            DmdFrame::Rgb24(rgb) => rgb.clone(),
        };
        screen.frame = Some(rgb);
        screen.frames_rendered += 1;
        Ok(())
    }

    fn set_color(&self, color: Color) -> Result<()> {
        self.screen.write().color = color;
        Ok(())
    }

    fn set_palette(&self, palette: &[Color]) -> Result<()> {
        if palette.len() < 2 {
            return Err(DmdError::PaletteLength {
                expected: 2,
                actual: palette.len(),
            });
        }
        self.screen.write().palette = Some(palette.to_vec());
        Ok(())
    }

    fn clear_color(&self) -> Result<()> {
        let mut screen = self.screen.write();
        screen.color = screen.default_color;
        Ok(())
    }

    fn clear_palette(&self) -> Result<()> {
        self.screen.write().palette = None;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut screen = self.screen.write();
        if let Some(frame) = screen.frame.take() {
            screen.frame = Some(Frame::blank(frame.dimensions(), BitDepth::Rgb24)?);
        }
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        let mut screen = self.screen.write();
        if !screen.disposed {
            screen.disposed = true;
            debug!("Virtual DMD {} closed", self.name);
        }
        Ok(())
    }
}

impl VirtualDmdView {
    /// The last rendered frame as RGB24.
    pub fn frame(&self) -> Option<Frame> {
        self.screen.read().frame.clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.screen.read().frames_rendered
    }

    pub fn color(&self) -> Color {
        self.screen.read().color
    }

    pub fn is_disposed(&self) -> bool {
        self.screen.read().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ColoredFrame, Dimensions};

    fn gray2() -> Frame {
        Frame::new(Dimensions::new(2, 1), BitDepth::Gray2, vec![0, 3]).unwrap()
    }

    #[test]
    fn tints_gray_frames() {
        let (dmd, view) = VirtualDmd::new("virtual", Color::RED);
        dmd.render(&DmdFrame::Gray(gray2())).unwrap();
        assert_eq!(view.frame().unwrap().data(), &[0, 0, 0, 255, 0, 0][..]);

        dmd.set_color(Color::BLUE).unwrap();
        dmd.render(&DmdFrame::Gray(gray2())).unwrap();
        assert_eq!(view.frame().unwrap().data(), &[0, 0, 0, 0, 0, 255][..]);

        dmd.clear_color().unwrap();
        assert_eq!(view.color(), Color::RED);
        assert_eq!(view.frames_rendered(), 2);
    }

    #[test]
    fn palette_overrides_tint() {
        let (dmd, view) = VirtualDmd::new("virtual", Color::RED);
        dmd.set_palette(&[Color::WHITE, Color::BLACK]).unwrap();
        dmd.render(&DmdFrame::Gray(gray2())).unwrap();
        assert_eq!(view.frame().unwrap().data(), &[255, 255, 255, 0, 0, 0][..]);
        assert!(dmd.set_palette(&[Color::RED]).is_err());
    }

    #[test]
    fn colored_frames_keep_their_palette() {
        let (dmd, view) = VirtualDmd::new("virtual", Color::RED);
        let colored = ColoredFrame::new(gray2(), vec![Color::BLUE, Color::BLUE, Color::BLUE, Color::WHITE]).unwrap();
        dmd.render(&DmdFrame::Colored(colored)).unwrap();
        assert_eq!(view.frame().unwrap().data(), &[0, 0, 255, 255, 255, 255][..]);

        dmd.clear().unwrap();
        assert!(view.frame().unwrap().data().iter().all(|&b| b == 0));
        dmd.dispose().unwrap();
        dmd.dispose().unwrap();
        assert!(view.is_disposed());
        assert!(dmd.render(&DmdFrame::Gray(gray2())).is_err());
    }
}
