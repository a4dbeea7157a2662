//! Tagged message format of the network source.
//!
//! A message starts with an ASCII name terminated by a NUL byte, followed by
//! little-endian fields:
//!
//! | name           | fields                                                   |
//! |----------------|----------------------------------------------------------|
//! | `color`        | `i32` color as `0xRRGGBB`                                |
//! | `palette`      | `i32` count, `count` × `i32` colors                      |
//! | `clearColor`   |                                                          |
//! | `clearPalette` |                                                          |
//! | `dimensions`   | `i32` width, `i32` height                                |
//! | `gameName`     | ASCII name, optionally NUL terminated                    |
//! | `rgb24`        | `u32` timestamp, RGB triplets                            |
//! | `gray2Planes`  | `u32` timestamp, 2 planes                                |
//! | `gray4Planes`  | `u32` timestamp, 4 planes                                |
//! | `coloredGray2` | `u32` timestamp, `i32` count, colors, 2 planes           |
//! | `coloredGray4` | `u32` timestamp, `i32` count, colors, 4 planes           |
//! | `coloredGray6` | `u32` timestamp, `i32` count, colors, 24 rotation bytes, 6 planes |
//!
//! Frame messages use the dimensions of the last `dimensions` message on
//! the same connection, 128x32 until one arrives.

use bytes::{Buf, Bytes};

use crate::capture::SourceEvent;
use crate::codec;
use crate::error::{DmdError, Result};
use crate::frame::palette::fit_palette;
use crate::frame::{BitDepth, Color, ColoredFrame, Dimensions, DmdFrame, Frame};

pub const DEFAULT_DIMENSIONS: Dimensions = Dimensions::new(128, 32);

const ROTATION_BYTES: usize = 24;
const MAX_PALETTE_LEN: usize = 256;

/// Per-connection decoder state.
#[derive(Debug, Clone)]
pub struct WireDecoder {
    dimensions: Dimensions,
}

impl Default for WireDecoder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl WireDecoder {
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Decodes one message. `dimensions` only updates the decoder and yields
    /// no event.
    pub fn decode(&mut self, message: Bytes) -> Result<Option<SourceEvent>> {
        let nul = message
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DmdError::Protocol("message name is not terminated".into()))?;
        let name = std::str::from_utf8(&message[..nul])
            .map_err(|_| DmdError::Protocol("message name is not ASCII".into()))?
            .to_string();
        let mut body = message.slice(nul + 1..);

        let event = match name.as_str() {
            "color" => SourceEvent::SetColor(read_color(&mut body)?),
            "palette" => SourceEvent::SetPalette(read_palette(&mut body)?),
            "clearColor" => SourceEvent::ClearColor,
            "clearPalette" => SourceEvent::ClearPalette,
            "dimensions" => {
                let width = read_i32(&mut body)?;
                let height = read_i32(&mut body)?;
                let dim = Dimensions::new(to_u32(width)?, to_u32(height)?);
                dim.validate()?;
                self.dimensions = dim;
                return Ok(None);
            }
            "gameName" => {
                let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                let game = String::from_utf8_lossy(&body[..end]).into_owned();
                SourceEvent::GameName(game)
            }
            "rgb24" => {
                read_u32(&mut body)?;
                SourceEvent::Frame(DmdFrame::Rgb24(Frame::new(
                    self.dimensions,
                    BitDepth::Rgb24,
                    body,
                )?))
            }
            "gray2Planes" => self.gray(BitDepth::Gray2, &mut body)?,
            "gray4Planes" => self.gray(BitDepth::Gray4, &mut body)?,
            "coloredGray2" => self.colored(BitDepth::Gray2, &mut body)?,
            "coloredGray4" => self.colored(BitDepth::Gray4, &mut body)?,
            "coloredGray6" => self.colored(BitDepth::Gray6, &mut body)?,
            other => return Err(DmdError::Protocol(format!("unknown message {:?}", other))),
        };
        Ok(Some(event))
    }

    fn planes(&self, depth: BitDepth, body: &Bytes) -> Result<Frame> {
        let planes = codec::chunk_planes(self.dimensions, depth.bits(), body)?;
        let data = codec::merge_planes(self.dimensions, &planes)?;
        Frame::new(self.dimensions, depth, data)
    }

    fn gray(&self, depth: BitDepth, body: &mut Bytes) -> Result<SourceEvent> {
        read_u32(body)?;
        Ok(SourceEvent::Frame(DmdFrame::Gray(self.planes(depth, body)?)))
    }

    fn colored(&self, depth: BitDepth, body: &mut Bytes) -> Result<SourceEvent> {
        read_u32(body)?;
        let palette = read_palette(body)?;
        if depth == BitDepth::Gray6 {
            // color rotation is not supported
            ensure(body, ROTATION_BYTES)?;
            body.advance(ROTATION_BYTES);
        }
        let frame = self.planes(depth, body)?;
        let palette = fit_palette(&palette, depth.num_colors())?;
        Ok(SourceEvent::Frame(DmdFrame::Colored(ColoredFrame::new(
            frame, palette,
        )?)))
    }
}

fn ensure(body: &Bytes, len: usize) -> Result<()> {
    if body.remaining() < len {
        return Err(DmdError::Protocol(format!(
            "message truncated: {} bytes left, {} needed",
            body.remaining(),
            len
        )));
    }
    Ok(())
}

fn read_u32(body: &mut Bytes) -> Result<u32> {
    ensure(body, 4)?;
    Ok(body.get_u32_le())
}

fn read_i32(body: &mut Bytes) -> Result<i32> {
    ensure(body, 4)?;
    Ok(body.get_i32_le())
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| DmdError::Protocol(format!("negative value {}", value)))
}

fn read_color(body: &mut Bytes) -> Result<Color> {
    Ok(Color::from_int(read_u32(body)? & 0x00ff_ffff))
}

fn read_palette(body: &mut Bytes) -> Result<Vec<Color>> {
    let len = to_u32(read_i32(body)?)? as usize;
    if len > MAX_PALETTE_LEN {
        return Err(DmdError::Protocol(format!("palette of {} colors", len)));
    }
    ensure(body, len * 4)?;
    (0..len).map(|_| read_color(body)).collect()
}
