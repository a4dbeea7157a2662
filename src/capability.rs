//! Destination capabilities and format negotiation.
//!
//! A destination declares which frame kinds it renders. For every incoming
//! frame format the graph picks a [`Route`] once per destination and caches
//! it, so negotiation is a table lookup over the declared flags.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;

use crate::codec;
use crate::error::{DmdError, Result};
use crate::frame::{BitDepth, Color, ColoredFrame, Dimensions, DmdFrame, Frame, FrameFormat};

bitflags! {
    /// Frame representations a destination can render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameKinds: u16 {
        const GRAY2 = 1 << 0;
        const GRAY4 = 1 << 1;
        const GRAY6 = 1 << 2;
        const COLORED_GRAY2 = 1 << 3;
        const COLORED_GRAY4 = 1 << 4;
        const COLORED_GRAY6 = 1 << 5;
        const RGB24 = 1 << 6;
        /// Accepts the raw payload bytes through `render_raw`.
        const RAW = 1 << 7;

        const ALL_GRAY = Self::GRAY2.bits() | Self::GRAY4.bits() | Self::GRAY6.bits();
        const ALL_COLORED = Self::COLORED_GRAY2.bits()
            | Self::COLORED_GRAY4.bits()
            | Self::COLORED_GRAY6.bits();
    }
}

impl FrameKinds {
    /// Flag for plain gray frames of `depth`, if there is one.
    pub fn gray(depth: BitDepth) -> Option<FrameKinds> {
        match depth {
            BitDepth::Gray2 => Some(FrameKinds::GRAY2),
            BitDepth::Gray4 => Some(FrameKinds::GRAY4),
            BitDepth::Gray6 => Some(FrameKinds::GRAY6),
            _ => None,
        }
    }

    /// Flag for colored frames of `depth`, if there is one.
    pub fn colored(depth: BitDepth) -> Option<FrameKinds> {
        match depth {
            BitDepth::Gray2 => Some(FrameKinds::COLORED_GRAY2),
            BitDepth::Gray4 => Some(FrameKinds::COLORED_GRAY4),
            BitDepth::Gray6 => Some(FrameKinds::COLORED_GRAY6),
            _ => None,
        }
    }
}

/// What a destination declares about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    kinds: FrameKinds,
    fixed_size: Option<Dimensions>,
    lookup_tables: HashMap<(BitDepth, BitDepth), Vec<u8>>,
}

impl Capabilities {
    pub fn new(kinds: FrameKinds) -> Self {
        Self {
            kinds,
            fixed_size: None,
            lookup_tables: HashMap::new(),
        }
    }

    /// Only frames of exactly `dim` are accepted; the graph resizes upstream.
    pub fn with_fixed_size(mut self, dim: Dimensions) -> Self {
        self.fixed_size = Some(dim);
        self
    }

    /// Overrides the table used to widen `from` samples to `to`.
    pub fn with_lookup_table(mut self, from: BitDepth, to: BitDepth, table: Vec<u8>) -> Result<Self> {
        if table.len() != from.num_colors() {
            return Err(DmdError::BufferLength {
                expected: from.num_colors(),
                actual: table.len(),
            });
        }
        if let Some(&value) = table.iter().find(|&&v| v as usize >= to.num_colors()) {
            return Err(DmdError::Incompatible(format!(
                "lookup value {} doesn't fit {}",
                value, to
            )));
        }
        self.lookup_tables.insert((from, to), table);
        Ok(self)
    }

    pub fn kinds(&self) -> FrameKinds {
        self.kinds
    }

    pub fn fixed_size(&self) -> Option<Dimensions> {
        self.fixed_size
    }

    pub fn supports_gray(&self, depth: BitDepth) -> bool {
        FrameKinds::gray(depth).is_some_and(|k| self.kinds.contains(k))
    }

    pub fn supports_colored(&self, depth: BitDepth) -> bool {
        FrameKinds::colored(depth).is_some_and(|k| self.kinds.contains(k))
    }

    pub fn supports_rgb24(&self) -> bool {
        self.kinds.contains(FrameKinds::RGB24)
    }

    pub fn supports_raw(&self) -> bool {
        self.kinds.contains(FrameKinds::RAW)
    }

    /// The destination's own table, falling back to the built-in one.
    pub fn lookup_table(&self, from: BitDepth, to: BitDepth) -> Option<&[u8]> {
        self.lookup_tables
            .get(&(from, to))
            .map(Vec::as_slice)
            .or_else(|| codec::gray_lut(from, to))
    }

    /// Picks the least lossy way to present `format` to this destination.
    ///
    /// Gray frames prefer, in order: the same depth, a colored frame of the
    /// same depth using the graph palette, a wider gray depth through a lookup
    /// table, RGB24 through the palette, a narrower gray depth, raw bytes.
    /// Colored frames prefer the same colored depth, then RGB24, then dropping
    /// the palette. RGB24 frames only go to RGB24 or raw destinations.
    pub fn negotiate(&self, format: FrameFormat) -> Option<Route> {
        match format {
            FrameFormat::Gray(depth) => self
                .exact_gray(depth)
                .or_else(|| self.supports_colored(depth).then_some(Route::Colorize))
                .or_else(|| self.widen(depth))
                .or_else(|| self.supports_rgb24().then_some(Route::PaletteToRgb24))
                .or_else(|| self.narrow(depth))
                .or_else(|| self.raw()),
            FrameFormat::Colored(depth) => (self.supports_colored(depth).then_some(Route::Direct))
                .or_else(|| self.supports_rgb24().then_some(Route::PaletteToRgb24))
                .or_else(|| self.supports_gray(depth).then_some(Route::DropPalette))
                .or_else(|| self.widen(depth))
                .or_else(|| self.narrow(depth))
                .or_else(|| self.raw()),
            FrameFormat::Rgb24 => (self.supports_rgb24().then_some(Route::Direct)).or_else(|| self.raw()),
        }
    }

    fn exact_gray(&self, depth: BitDepth) -> Option<Route> {
        self.supports_gray(depth).then_some(Route::Direct)
    }

    fn widen(&self, depth: BitDepth) -> Option<Route> {
        BitDepth::GRAY
            .into_iter()
            .filter(|to| to.bits() > depth.bits())
            .find(|&to| self.supports_gray(to) && self.lookup_table(depth, to).is_some())
            .map(Route::Remap)
    }

    fn narrow(&self, depth: BitDepth) -> Option<Route> {
        BitDepth::GRAY
            .into_iter()
            .rev()
            .filter(|to| to.bits() < depth.bits())
            .find(|&to| self.supports_gray(to) && self.lookup_table(depth, to).is_some())
            .map(Route::Remap)
    }

    fn raw(&self) -> Option<Route> {
        self.supports_raw().then_some(Route::Raw)
    }
}

/// How a frame is transformed before it reaches one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The frame is handed over as is.
    Direct,
    /// A gray frame gets the graph palette attached.
    Colorize,
    /// Gray samples are mapped to another depth through the destination's
    /// lookup table. Colored frames lose their palette.
    Remap(BitDepth),
    /// Samples are expanded through the palette into RGB24.
    PaletteToRgb24,
    /// A colored frame is sent as plain gray.
    DropPalette,
    /// The raw payload bytes are sent through `render_raw`.
    Raw,
}

/// What a route produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Frame(DmdFrame),
    Raw(Bytes),
}

impl Route {
    /// Converts `frame` along this route. `palette` is the graph palette
    /// resolved for the frame's depth and is required to color gray frames.
    pub fn apply(
        self,
        frame: &DmdFrame,
        palette: Option<&Arc<[Color]>>,
        caps: &Capabilities,
    ) -> Result<Payload> {
        let raster = frame.raster();
        let converted = match (self, frame) {
            (Route::Direct, _) => frame.clone(),
            (Route::Raw, _) => return Ok(Payload::Raw(raster.bytes().clone())),
            (Route::Colorize, DmdFrame::Gray(gray)) => {
                DmdFrame::Colored(ColoredFrame::new(gray.clone(), require(palette)?.clone())?)
            }
            (Route::PaletteToRgb24, DmdFrame::Gray(gray)) => {
                let colored = ColoredFrame::new(gray.clone(), require(palette)?.clone())?;
                DmdFrame::Rgb24(colored.to_rgb24()?)
            }
            (Route::PaletteToRgb24, DmdFrame::Colored(colored)) => DmdFrame::Rgb24(colored.to_rgb24()?),
            (Route::DropPalette, DmdFrame::Colored(colored)) => DmdFrame::Gray(colored.frame().clone()),
            (Route::Remap(to), DmdFrame::Gray(_) | DmdFrame::Colored(_)) => {
                let from = raster.depth();
                let table = caps.lookup_table(from, to).ok_or_else(|| {
                    DmdError::Incompatible(format!("no lookup table from {} to {}", from, to))
                })?;
                let data = codec::remap_gray(raster.data(), table)?;
                DmdFrame::Gray(Frame::new(raster.dimensions(), to, data)?)
            }
            (route, frame) => {
                return Err(DmdError::Incompatible(format!(
                    "{:?} doesn't apply to {} frames",
                    route,
                    frame.format()
                )))
            }
        };
        Ok(Payload::Frame(converted))
    }
}

fn require(palette: Option<&Arc<[Color]>>) -> Result<&Arc<[Color]>> {
    palette.ok_or_else(|| DmdError::Incompatible("no palette to color a gray frame".into()))
}
