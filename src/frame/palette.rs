//! Colors and palettes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DmdError, Result};

/// An RGB color. Serialized as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const RED: Color = Color::rgb(0xff, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 0xff);
    /// Tint used for grayscale sources when nothing else is configured.
    pub const ORANGE_RED: Color = Color::rgb(0xff, 0x45, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packs as `0xRRGGBB`.
    pub const fn to_int(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub const fn from_int(value: u32) -> Self {
        Self::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Linear mix, `p = 0` is `self`, `p = 1` is `other`.
    pub fn mix(self, other: Color, p: f64) -> Color {
        let lerp = |a: u8, b: u8| (a as f64 * (1.0 - p) + b as f64 * p).round() as u8;
        Color::rgb(
            lerp(self.r, other.r),
            lerp(self.g, other.g),
            lerp(self.b, other.b),
        )
    }
}

impl FromStr for Color {
    type Err = DmdError;

    /// Accepts `RRGGBB` and `AARRGGBB`, with or without a leading `#`.
    /// Alpha is dropped.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || DmdError::InvalidColor(s.to_string());
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        Ok(Color::from_int(value & 0x00ff_ffff))
    }
}

impl TryFrom<String> for Color {
    type Error = DmdError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> String {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Black-to-`color` ramp with `num_colors` shades.
pub fn gradient(color: Color, num_colors: usize) -> Vec<Color> {
    interpolate(&[Color::BLACK, color], num_colors)
}

/// Adapts a palette of any size to `num_colors` entries.
///
/// Exact sizes pass through. 16 and 64 color palettes keep the shades a
/// 2-bit device lights up (0, 1, 4, 15) when fitted to 4 colors, and 64
/// color palettes keep their first 16 entries when fitted to 16. Anything
/// else is linearly interpolated.
pub fn fit_palette(colors: &[Color], num_colors: usize) -> Result<Vec<Color>> {
    if colors.len() < 2 {
        return Err(DmdError::PaletteLength {
            expected: 2,
            actual: colors.len(),
        });
    }
    if colors.len() == num_colors {
        return Ok(colors.to_vec());
    }
    if (colors.len() == 16 || colors.len() == 64) && num_colors == 4 {
        return Ok(vec![colors[0], colors[1], colors[4], colors[15]]);
    }
    if colors.len() == 64 && num_colors == 16 {
        return Ok(colors[..16].to_vec());
    }
    Ok(interpolate(colors, num_colors))
}

fn interpolate(colors: &[Color], num_colors: usize) -> Vec<Color> {
    if num_colors < 2 {
        return colors.iter().take(num_colors).copied().collect();
    }
    let last_segment = colors.len() - 2;
    let to_step = 1.0 / (num_colors - 1) as f64;
    let from_step = 1.0 / (colors.len() - 1) as f64;
    let mut from = 0usize;
    (0..num_colors)
        .map(|to| {
            let segment = from.min(last_segment);
            let relative = (to as f64 * to_step - segment as f64 * from_step) / from_step;
            let color = colors[segment].mix(colors[segment + 1], relative.clamp(0.0, 1.0));
            while from_step * ((from + 1) as f64) < to_step * ((to + 1) as f64) {
                from += 1;
            }
            color
        })
        .collect()
}

/// Parses a palette file: one color per line, blank lines and lines
/// starting with `#` followed by whitespace or nothing are skipped.
pub fn parse_palette(text: &str) -> Result<Vec<Color>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_comment(line))
        .map(str::parse)
        .collect()
}

fn is_comment(line: &str) -> bool {
    match line.strip_prefix('#') {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with('#'),
        None => line.starts_with("//"),
    }
}
