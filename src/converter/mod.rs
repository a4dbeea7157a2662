//! Optional stage that attaches or replaces the color mapping of a frame.

mod colorizer;
mod loader;
mod switching;

pub use colorizer::PaletteColorizer;
pub use loader::{ColorizationLoader, PaletteDirLoader};
pub use switching::SwitchingConverter;

use crate::error::Result;
use crate::frame::{DmdFrame, FrameFormat};

/// Transforms a frame into another representation.
///
/// Converters are shared between the render thread and whoever swaps them,
/// so `convert` takes `&self`.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether frames of `format` are converted. Frames this returns false
    /// for pass the stage unchanged.
    fn accepts(&self, format: FrameFormat) -> bool;

    fn convert(&self, frame: &DmdFrame) -> Result<DmdFrame>;
}
