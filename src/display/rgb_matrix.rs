//! RGB LED matrix behind a serial link.
//!
//! Frames are packed to RGB565, serialized into dot-pair sub-frames for the
//! panel's shift registers and sent after a one byte frame command.

use std::io::Write;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::capability::{Capabilities, FrameKinds};
use crate::codec::{self, ColorOrder};
use crate::display::{unexpected, write_frame, Destination};
use crate::error::{DmdError, Result};
use crate::frame::{Dimensions, DmdFrame};

const FRAME_COMMAND: u8 = 0x1f;
const ENABLE_COMMAND: u8 = 0x1e;
const LOGICAL_ROWS: u32 = 16;
/// Chained shift registers, in units of 32 pixels.
const SHIFTER_LEN_32: u8 = 4;

struct MatrixState<W> {
    transport: Option<W>,
    buffer: Vec<u8>,
}

pub struct RgbMatrix<W> {
    name: String,
    dim: Dimensions,
    order: ColorOrder,
    capabilities: Capabilities,
    state: Mutex<MatrixState<W>>,
}

impl<W: Write + Send> RgbMatrix<W> {
    /// Puts the matrix into streaming mode.
    #[instrument(skip(transport))]
    pub fn new(name: &str, mut transport: W, dim: Dimensions, order: ColorOrder) -> Result<Self> {
        dim.validate()?;
        if dim.width % 32 != 0 || dim.height % 32 != 0 {
            return Err(DmdError::InvalidDimensions {
                dim,
                reason: "matrix is made of 32x32 panels",
            });
        }
        let rows_flag = if LOGICAL_ROWS == 8 { 0 } else { 1 };
        transport.write_all(&[ENABLE_COMMAND, (SHIFTER_LEN_32 & 0x0f) | (rows_flag << 4)])?;
        transport.flush()?;

        let mut buffer = vec![0u8; dim.surface() * 3 / 2 + 1];
        buffer[0] = FRAME_COMMAND;
        info!("RGB matrix {} streaming at {}", name, dim);

        Ok(Self {
            name: name.to_string(),
            dim,
            order,
            capabilities: Capabilities::new(FrameKinds::RGB24).with_fixed_size(dim),
            state: Mutex::new(MatrixState {
                transport: Some(transport),
                buffer,
            }),
        })
    }

    fn send(&self, state: &mut MatrixState<W>) -> Result<()> {
        let MatrixState { transport, buffer } = state;
        let transport = transport
            .as_mut()
            .ok_or_else(|| DmdError::Disposed(self.name.clone()))?;
        write_frame(&self.name, transport, buffer)?;
        metrics::counter!("device_writes").increment(1);
        Ok(())
    }
}

impl<W: Write + Send> Destination for RgbMatrix<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn render(&self, frame: &DmdFrame) -> Result<()> {
        let rgb = match frame {
            DmdFrame::Rgb24(f) if f.dimensions() == self.dim => f,
            other => return Err(unexpected(&self.name, other)),
        };
        let words = codec::convert_rgb24_to_rgb565_words(rgb.data())?;
        let planes = codec::split_into_rgb_planes(&words, self.dim.width, LOGICAL_ROWS, self.order)?;

        let mut state = self.state.lock();
        if state.transport.is_none() {
            return Err(DmdError::Disposed(self.name.clone()));
        }
        if !codec::diff_and_copy(&planes, &mut state.buffer[1..])? {
            trace!("{}: frame unchanged", self.name);
            return Ok(());
        }
        self.send(&mut state)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.buffer[1..].fill(0);
        self.send(&mut state)
    }

    fn dispose(&self) -> Result<()> {
        if let Some(mut transport) = self.state.lock().transport.take() {
            transport.flush()?;
            debug!("RGB matrix {} closed", self.name);
        }
        Ok(())
    }
}
