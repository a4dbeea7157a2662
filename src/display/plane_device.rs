//! Plane-serial gray panel.
//!
//! Every frame goes out as a four byte sync header followed by the four bit
//! planes of a 4-bit frame. 2-bit content is widened with the panel's own
//! table, which maps to the shades its firmware shows best.

use std::io::Write;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::capability::{Capabilities, FrameKinds};
use crate::codec::{self, GRAY2_TO_GRAY4};
use crate::display::{unexpected, write_frame, Destination};
use crate::error::{DmdError, Result};
use crate::frame::{BitDepth, Dimensions, DmdFrame};

pub const SYNC_HEADER: [u8; 4] = [0x81, 0xc3, 0xe7, 0x00];
pub const DEFAULT_DIMENSIONS: Dimensions = Dimensions::new(128, 32);

const PLANES: u32 = 4;

struct DeviceState<W> {
    transport: Option<W>,
    buffer: Vec<u8>,
}

pub struct PlaneDevice<W> {
    name: String,
    dim: Dimensions,
    capabilities: Capabilities,
    state: Mutex<DeviceState<W>>,
}

impl<W: Write + Send> PlaneDevice<W> {
    #[instrument(skip(transport))]
    pub fn new(name: &str, transport: W, dim: Dimensions) -> Result<Self> {
        dim.validate()?;
        if dim.surface() % 8 != 0 {
            return Err(DmdError::InvalidDimensions {
                dim,
                reason: "surface must be a multiple of 8",
            });
        }
        let capabilities = Capabilities::new(FrameKinds::GRAY4)
            .with_fixed_size(dim)
            .with_lookup_table(BitDepth::Gray2, BitDepth::Gray4, GRAY2_TO_GRAY4.to_vec())?;

        let mut buffer = vec![0u8; SYNC_HEADER.len() + dim.surface() / 2];
        buffer[..SYNC_HEADER.len()].copy_from_slice(&SYNC_HEADER);
        info!("Plane device {} ready at {}", name, dim);

        Ok(Self {
            name: name.to_string(),
            dim,
            capabilities,
            state: Mutex::new(DeviceState {
                transport: Some(transport),
                buffer,
            }),
        })
    }

    /// Writes the whole buffer, sync header included.
    fn send(&self, state: &mut DeviceState<W>) -> Result<()> {
        let DeviceState { transport, buffer } = state;
        let transport = transport
            .as_mut()
            .ok_or_else(|| DmdError::Disposed(self.name.clone()))?;
        write_frame(&self.name, transport, buffer)?;
        metrics::counter!("device_writes").increment(1);
        Ok(())
    }
}

impl<W: Write + Send> Destination for PlaneDevice<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn render(&self, frame: &DmdFrame) -> Result<()> {
        let gray = match frame {
            DmdFrame::Gray(f) if f.depth() == BitDepth::Gray4 && f.dimensions() == self.dim => f,
            other => return Err(unexpected(&self.name, other)),
        };
        let planes = codec::split_into_planes(self.dim, PLANES, gray.data())?;

        let mut state = self.state.lock();
        if state.transport.is_none() {
            return Err(DmdError::Disposed(self.name.clone()));
        }
        if !codec::copy_planes(&planes, &mut state.buffer, SYNC_HEADER.len())? {
            trace!("{}: frame unchanged", self.name);
            return Ok(());
        }
        self.send(&mut state)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.buffer[SYNC_HEADER.len()..].fill(0);
        self.send(&mut state)
    }

    fn dispose(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(mut transport) = state.transport.take() {
            transport.flush()?;
            debug!("Plane device {} closed", self.name);
        }
        Ok(())
    }
}
