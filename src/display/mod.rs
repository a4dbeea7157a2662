//! Frame destinations.
//!
//! Destinations are shared between the render thread and their owner, who
//! may clear or dispose them at any time, so every call takes `&self` and
//! device writes are serialized behind a lock.

pub mod plane_device;
pub mod rgb_matrix;
pub mod virtual_dmd;

pub use plane_device::PlaneDevice;
pub use rgb_matrix::RgbMatrix;
pub use virtual_dmd::{VirtualDmd, VirtualDmdView};

use std::io::{ErrorKind, Write};

use crate::capability::Capabilities;
use crate::error::{DmdError, Result};
use crate::frame::{Color, DmdFrame};

/// A display device, physical or virtual.
///
/// `render` only ever receives frames in one of the formats the
/// capabilities declare, already resized if the destination is fixed size.
/// Implementations must keep it bounded: the whole graph waits on it.
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    fn render(&self, frame: &DmdFrame) -> Result<()>;

    /// Receives the payload bytes when the destination declares
    /// [`FrameKinds::RAW`](crate::capability::FrameKinds::RAW).
    fn render_raw(&self, _data: &[u8]) -> Result<()> {
        Err(DmdError::Incompatible(format!(
            "{} doesn't take raw data",
            self.name()
        )))
    }

    fn set_color(&self, _color: Color) -> Result<()> {
        Ok(())
    }

    fn set_palette(&self, _palette: &[Color]) -> Result<()> {
        Ok(())
    }

    fn clear_color(&self) -> Result<()> {
        Ok(())
    }

    fn clear_palette(&self) -> Result<()> {
        Ok(())
    }

    /// Blanks the display.
    fn clear(&self) -> Result<()>;

    /// Releases the device. Calling it again does nothing.
    fn dispose(&self) -> Result<()>;
}

pub(crate) fn unexpected(name: &str, frame: &DmdFrame) -> DmdError {
    DmdError::Incompatible(format!(
        "{} can't render {} frames of {}",
        name,
        frame.format(),
        frame.dimensions()
    ))
}

/// Writes and flushes `buf`. A timed out transport is a device error.
pub(crate) fn write_frame<W: Write>(name: &str, transport: &mut W, buf: &[u8]) -> Result<()> {
    transport
        .write_all(buf)
        .and_then(|()| transport.flush())
        .map_err(|e| match e.kind() {
            ErrorKind::TimedOut => DmdError::device(name, e.to_string()),
            _ => DmdError::Io(e),
        })
}
