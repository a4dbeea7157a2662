use std::cmp::Ordering;
use std::fmt;
use std::ops::{Div, Mul};

use serde::{Deserialize, Serialize};

use crate::error::{DmdError, Result};

/// Pixel dimensions of a frame or a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub const fn surface(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const fn is_flat(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn fits_into(&self, other: Dimensions) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    pub const fn is_double_size_of(&self, other: Dimensions) -> bool {
        self.width as u64 == other.width as u64 * 2 && self.height as u64 == other.height as u64 * 2
    }

    /// Scales both sides by `factor`, failing instead of overflowing.
    pub fn checked_mul(&self, factor: u32) -> Result<Dimensions> {
        match (self.width.checked_mul(factor), self.height.checked_mul(factor)) {
            (Some(width), Some(height)) => Ok(Dimensions::new(width, height)),
            _ => Err(DmdError::InvalidDimensions {
                dim: *self,
                reason: "too large to scale",
            }),
        }
    }

    /// Fails for zero-sized dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.is_flat() {
            return Err(DmdError::InvalidDimensions {
                dim: *self,
                reason: "zero-sized",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Ordered by surface. Distinct dimensions with the same surface are
/// unordered.
impl PartialOrd for Dimensions {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.surface().cmp(&other.surface()) {
            Ordering::Equal => None,
            ord => Some(ord),
        }
    }
}

/// Panics if a side overflows `u32`; see [`Dimensions::checked_mul`].
impl Mul<u32> for Dimensions {
    type Output = Dimensions;

    fn mul(self, rhs: u32) -> Dimensions {
        Dimensions::new(self.width * rhs, self.height * rhs)
    }
}

impl Div<u32> for Dimensions {
    type Output = Dimensions;

    fn div(self, rhs: u32) -> Dimensions {
        Dimensions::new(self.width / rhs, self.height / rhs)
    }
}
