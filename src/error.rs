//! Error types for the frame pipeline.
//!
//! Construction errors surface before a graph starts, conversion errors are
//! scoped to one frame and one destination, device errors take a destination
//! out of the graph for the rest of the session.

use thiserror::Error;

use crate::frame::Dimensions;

/// The error type shared by every component of the crate.
#[derive(Debug, Error)]
pub enum DmdError {
    // ── Construction ─────────────────────────────────────────────
    /// Width or height is zero, or the layout requires a multiple it doesn't have.
    #[error("invalid dimensions {dim}: {reason}")]
    InvalidDimensions {
        dim: Dimensions,
        reason: &'static str,
    },

    /// Bit depth outside of 2, 4, 6, 8 and 24.
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u32),

    /// A color string could not be parsed.
    #[error("invalid color {0:?}")]
    InvalidColor(String),

    /// The configuration could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// An image file could not be decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    // ── Conversion ───────────────────────────────────────────────
    /// A buffer is not sized as its dimensions and depth require.
    #[error("buffer length mismatch: expected {expected} bytes, got {actual}")]
    BufferLength { expected: usize, actual: usize },

    /// A palette doesn't have the number of entries the depth requires.
    #[error("palette length mismatch: expected {expected} colors, got {actual}")]
    PaletteLength { expected: usize, actual: usize },

    /// Wrong number of bit planes for the requested operation.
    #[error("plane count mismatch: expected {expected}, got {actual}")]
    PlaneCount { expected: usize, actual: usize },

    /// A pixel sample points past the end of the palette.
    #[error("sample {sample} at pixel {pixel} exceeds palette of {len} colors")]
    PaletteIndex {
        sample: u8,
        pixel: usize,
        len: usize,
    },

    /// A pixel sample points past the end of a gray lookup table.
    #[error("sample {sample} at pixel {pixel} exceeds lookup table of {len} entries")]
    LookupIndex {
        sample: u8,
        pixel: usize,
        len: usize,
    },

    /// The frame can't be represented in the requested format.
    #[error("incompatible frame: {0}")]
    Incompatible(String),

    // ── Devices & transports ─────────────────────────────────────
    /// The underlying transport reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A device rejected a frame or is in a state it can't render from.
    #[error("device {name}: {reason}")]
    Device { name: String, reason: String },

    /// The destination or source has already released its resources.
    #[error("{0} is disposed")]
    Disposed(String),

    /// A message on an ingestion channel violated the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    // ── Lifecycle ────────────────────────────────────────────────
    /// Operation not permitted in the current graph state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    /// A frame channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl DmdError {
    /// Whether this is a per-frame conversion error rather than a device or
    /// lifecycle failure.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            DmdError::BufferLength { .. }
                | DmdError::PaletteLength { .. }
                | DmdError::PlaneCount { .. }
                | DmdError::PaletteIndex { .. }
                | DmdError::LookupIndex { .. }
                | DmdError::Incompatible(_)
        )
    }

    pub(crate) fn device(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DmdError::Device {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl<T> From<flume::SendError<T>> for DmdError {
    fn from(_: flume::SendError<T>) -> Self {
        DmdError::ChannelClosed
    }
}

pub type Result<T> = std::result::Result<T, DmdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DmdError::BufferLength {
            expected: 4096,
            actual: 12,
        };
        assert!(e.to_string().contains("4096"));
        assert!(e.to_string().contains("12"));

        let e = DmdError::InvalidDimensions {
            dim: Dimensions::new(0, 32),
            reason: "zero-sized",
        };
        assert_eq!(e.to_string(), "invalid dimensions 0x32: zero-sized");
    }

    #[test]
    fn conversion_errors_are_classified() {
        assert!(DmdError::PaletteIndex {
            sample: 5,
            pixel: 0,
            len: 4
        }
        .is_conversion());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!DmdError::from(io).is_conversion());
        assert!(!DmdError::device("PinDMD", "timeout").is_conversion());
    }
}
