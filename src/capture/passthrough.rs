use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::capture::{already_started, FrameSink, Source, SourceEvent};
use crate::error::Result;
use crate::frame::{Color, DmdFrame};

/// A source fed by host code through a [`PassthroughHandle`].
///
/// Used by plugins that receive frames through callbacks. Pushing into a
/// handle whose source isn't running is a no-op.
pub struct PassthroughSource {
    name: String,
    sink: Arc<Mutex<Option<FrameSink>>>,
    started: bool,
}

/// Cloneable producer side of a [`PassthroughSource`].
#[derive(Clone)]
pub struct PassthroughHandle {
    sink: Arc<Mutex<Option<FrameSink>>>,
}

impl PassthroughSource {
    pub fn new(name: impl Into<String>) -> (Self, PassthroughHandle) {
        let sink = Arc::new(Mutex::new(None));
        let source = Self {
            name: name.into(),
            sink: sink.clone(),
            started: false,
        };
        (source, PassthroughHandle { sink })
    }
}

impl Source for PassthroughSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.started {
            return Err(already_started("running"));
        }
        self.started = true;
        *self.sink.lock() = Some(sink);
        debug!("Passthrough source {} connected", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.sink.lock().take();
        debug!("Passthrough source {} disconnected", self.name);
        Ok(())
    }
}

impl PassthroughHandle {
    /// Forwards `event` if the source is running.
    pub fn send(&self, event: SourceEvent) -> Result<()> {
        // cloned so a blocking send doesn't hold the lock against `stop`
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.send(event),
            None => {
                trace!("Passthrough source not running, dropping event");
                Ok(())
            }
        }
    }

    pub fn next_frame(&self, frame: impl Into<DmdFrame>) -> Result<()> {
        self.send(SourceEvent::Frame(frame.into()))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(SourceEvent::Paused)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(SourceEvent::Resumed)
    }

    pub fn clear(&self) -> Result<()> {
        self.send(SourceEvent::Clear)
    }

    pub fn set_color(&self, color: Color) -> Result<()> {
        self.send(SourceEvent::SetColor(color))
    }

    pub fn set_palette(&self, palette: Vec<Color>) -> Result<()> {
        self.send(SourceEvent::SetPalette(palette))
    }

    pub fn set_game_name(&self, name: impl Into<String>) -> Result<()> {
        self.send(SourceEvent::GameName(name.into()))
    }

    pub fn is_connected(&self) -> bool {
        self.sink.lock().is_some()
    }
}
