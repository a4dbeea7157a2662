//! Frame sources.
//!
//! A source owns whatever thread or task produces its frames and pushes
//! them into the [`FrameSink`] the render graph hands it on start. The sink
//! is a bounded channel, so a source is blocked while the graph is still
//! dispatching the previous frame.

pub mod image;
pub mod network;
pub mod passthrough;
pub mod pipe;
pub mod wire;

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{trace, warn};

use crate::error::{DmdError, Result};
use crate::frame::{Color, DmdFrame};

pub use self::image::ImageSource;
pub use network::NetworkSource;
pub use passthrough::{PassthroughHandle, PassthroughSource};
pub use pipe::PipeSource;

/// How long `stop` waits for a producer thread before detaching it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a source can tell the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Frame(DmdFrame),
    /// The upstream game lost focus; frames are not rendered until resumed.
    Paused,
    Resumed,
    /// Blank every destination.
    Clear,
    SetColor(Color),
    SetPalette(Vec<Color>),
    ClearColor,
    ClearPalette,
    /// The upstream game was identified.
    GameName(String),
    /// The source can't produce anymore and the graph should stop.
    Ended(String),
}

/// What travels on the graph's channel.
#[derive(Debug)]
pub(crate) enum Message {
    Event(SourceEvent),
    Shutdown,
}

/// Producer end of a render graph's frame channel.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: Sender<Message>,
}

impl FrameSink {
    pub(crate) fn new(tx: Sender<Message>) -> Self {
        Self { tx }
    }

    /// Blocks until the graph has room for the event.
    pub fn send(&self, event: SourceEvent) -> Result<()> {
        trace!("Sending {:?}", event_name(&event));
        self.tx.send(Message::Event(event))?;
        Ok(())
    }

    /// Same as [`FrameSink::send`] without blocking the async runtime.
    pub async fn send_async(&self, event: SourceEvent) -> Result<()> {
        self.tx.send_async(Message::Event(event)).await?;
        Ok(())
    }

    pub fn frame(&self, frame: impl Into<DmdFrame>) -> Result<()> {
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

    pub fn ended(&self, reason: impl Into<String>) -> Result<()> {
        self.send(SourceEvent::Ended(reason.into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }
}

fn event_name(event: &SourceEvent) -> &'static str {
    match event {
        SourceEvent::Frame(_) => "frame",
        SourceEvent::Paused => "paused",
        SourceEvent::Resumed => "resumed",
        SourceEvent::Clear => "clear",
        SourceEvent::SetColor(_) => "color",
        SourceEvent::SetPalette(_) => "palette",
        SourceEvent::ClearColor => "clear color",
        SourceEvent::ClearPalette => "clear palette",
        SourceEvent::GameName(_) => "game name",
        SourceEvent::Ended(_) => "ended",
    }
}

/// A producer of frames.
pub trait Source: Send {
    fn name(&self) -> &str;

    /// Starts producing into `sink`. A source can be started once.
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stops producing and releases the source's resources, waiting at
    /// most [`STOP_TIMEOUT`] for its producer to finish.
    fn stop(&mut self) -> Result<()>;
}

/// Waits on a producer's completion channel.
///
/// Producers blocked in a read that can't be interrupted are detached after
/// the timeout; their next send fails once the graph is gone.
pub(crate) fn await_producer(name: &str, done: &Receiver<()>) {
    match done.recv_timeout(STOP_TIMEOUT) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "{} did not stop within {:?}, detaching its thread",
                name, STOP_TIMEOUT
            );
        }
    }
}

pub(crate) fn already_started(state: &'static str) -> DmdError {
    DmdError::InvalidState {
        action: "start source",
        state,
    }
}
