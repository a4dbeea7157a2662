//! The render graph.
//!
//! One source feeds a bounded channel; a dedicated render thread pulls each
//! event and runs the whole pipeline for it before taking the next one:
//! resize, flips, processors, converter, then per destination the fixed-size
//! resize, format negotiation and the render call. A slow destination
//! therefore slows the source down instead of queueing frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::capability::{Payload, Route};
use crate::capture::{FrameSink, Message, Source, SourceEvent, STOP_TIMEOUT};
use crate::converter::{ColorizationLoader, Converter, SwitchingConverter};
use crate::display::Destination;
use crate::error::{DmdError, Result};
use crate::frame::palette::{fit_palette, gradient};
use crate::frame::{BitDepth, Color, Dimensions, DmdFrame, FrameFormat};
use crate::pipeline::processor::Processor;
use crate::pipeline::stats::{GraphStats, StatsSnapshot};
use crate::pipeline::transform::{self, ResizeMode};

/// Consecutive conversion errors after which a destination is given up on.
pub const MAX_CONVERSION_FAILURES: u32 = 3;

/// Frames buffered between the source and the render thread.
const CHANNEL_CAPACITY: usize = 1;

/// Lifecycle of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GraphState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Disposed = 3,
}

impl GraphState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => GraphState::Idle,
            1 => GraphState::Running,
            2 => GraphState::Paused,
            _ => GraphState::Disposed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GraphState::Idle => "idle",
            GraphState::Running => "running",
            GraphState::Paused => "paused",
            GraphState::Disposed => "disposed",
        }
    }
}

#[derive(Debug, Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn get(&self) -> GraphState {
        GraphState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: GraphState) -> GraphState {
        GraphState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }

    fn transition(&self, from: GraphState, to: GraphState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// What to show when no frame arrived for a while.
#[derive(Debug, Clone)]
pub struct IdleOptions {
    pub timeout: Duration,
    /// Rendered instead of clearing the displays.
    pub image: Option<DmdFrame>,
}

/// Global pre-processing and coloring of a graph.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Frames are scaled to this size before anything else.
    pub dimensions: Option<Dimensions>,
    pub resize: ResizeMode,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Tint of gray frames without a palette.
    pub color: Color,
    pub palette: Option<Vec<Color>>,
    pub idle: Option<IdleOptions>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            resize: ResizeMode::Nearest,
            flip_horizontal: false,
            flip_vertical: false,
            color: Color::ORANGE_RED,
            palette: None,
            idle: None,
        }
    }
}

#[derive(Clone)]
struct Colorization {
    switching: Arc<SwitchingConverter>,
    loader: Arc<dyn ColorizationLoader>,
}

pub struct RenderGraphBuilder {
    name: String,
    source: Option<Box<dyn Source>>,
    processors: Vec<Box<dyn Processor>>,
    converter: Option<Arc<dyn Converter>>,
    colorization: Option<Colorization>,
    destinations: Vec<Arc<dyn Destination>>,
    options: GraphOptions,
}

impl RenderGraphBuilder {
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn boxed_source(mut self, source: Box<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Uses `switching` as the converter and swaps colorizations into it
    /// whenever the source reports a game name.
    pub fn colorization(
        mut self,
        switching: Arc<SwitchingConverter>,
        loader: Arc<dyn ColorizationLoader>,
    ) -> Self {
        self.converter = Some(switching.clone());
        self.colorization = Some(Colorization { switching, loader });
        self
    }

    pub fn destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<RenderGraph> {
        let source = self.source.ok_or(DmdError::InvalidState {
            action: "build a render graph",
            state: "missing a source",
        })?;
        if self.destinations.is_empty() {
            return Err(DmdError::InvalidState {
                action: "build a render graph",
                state: "missing destinations",
            });
        }
        if let Some(dim) = self.options.dimensions {
            dim.validate()?;
        }
        if let Some(palette) = &self.options.palette {
            check_palette(palette)?;
        }
        if let Some(idle) = &self.options.idle {
            if idle.timeout.is_zero() {
                return Err(DmdError::Incompatible("idle timeout must not be zero".into()));
            }
        }

        let state = Arc::new(SharedState::default());
        let stats = Arc::new(GraphStats::new());
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        let pipeline = Pipeline {
            name: self.name.clone(),
            processors: self.processors,
            converter: self.converter,
            colorization: self.colorization,
            slots: self.destinations.iter().cloned().map(Slot::new).collect(),
            color: self.options.color,
            palette: self.options.palette.clone(),
            palettes: HashMap::new(),
            options: self.options,
            state: state.clone(),
            stats: stats.clone(),
            last_frame: Instant::now(),
            idle_fired: false,
        };
        info!(
            "Render graph {} built with {} destination(s)",
            self.name,
            self.destinations.len()
        );

        Ok(RenderGraph {
            name: self.name,
            source,
            destinations: self.destinations,
            state,
            stats,
            tx,
            pending: Some((pipeline, rx)),
            worker: None,
        })
    }
}

fn check_palette(palette: &[Color]) -> Result<()> {
    if palette.len() < 2 {
        return Err(DmdError::PaletteLength {
            expected: 2,
            actual: palette.len(),
        });
    }
    Ok(())
}

/// One source routed to many destinations.
pub struct RenderGraph {
    name: String,
    source: Box<dyn Source>,
    destinations: Vec<Arc<dyn Destination>>,
    state: Arc<SharedState>,
    stats: Arc<GraphStats>,
    tx: Sender<Message>,
    pending: Option<(Pipeline, Receiver<Message>)>,
    worker: Option<Worker>,
}

/// The render thread and its completion signal.
struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl RenderGraph {
    pub fn builder(name: impl Into<String>) -> RenderGraphBuilder {
        RenderGraphBuilder {
            name: name.into(),
            source: None,
            processors: Vec::new(),
            converter: None,
            colorization: None,
            destinations: Vec::new(),
            options: GraphOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GraphState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn destinations(&self) -> &[Arc<dyn Destination>] {
        &self.destinations
    }

    /// Spawns the render thread and starts the source.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != GraphState::Idle {
            return Err(DmdError::InvalidState {
                action: "start",
                state: state.as_str(),
            });
        }
        let (pipeline, rx) = self.pending.take().ok_or(DmdError::InvalidState {
            action: "start",
            state: "started before",
        })?;
        self.state.set(GraphState::Running);
        let (done_tx, done) = flume::bounded(1);
        let handle = thread::Builder::new()
            .name(format!("graph-{}", self.name))
            .spawn(move || {
                pipeline.run(rx);
                let _ = done_tx.send(());
            })?;
        self.worker = Some(Worker { handle, done });

        if let Err(e) = self.source.start(FrameSink::new(self.tx.clone())) {
            error!("Source {} of {} failed to start: {}", self.source.name(), self.name, e);
            self.dispose()?;
            return Err(e);
        }
        info!("Render graph {} started from {}", self.name, self.source.name());
        Ok(())
    }

    /// Stops the source, lets the render thread drain and releases every
    /// destination. Terminal; calling it again does nothing.
    ///
    /// Waits at most [`STOP_TIMEOUT`] for the source and another
    /// [`STOP_TIMEOUT`] for the render thread. A render thread stuck in a
    /// destination is detached and releases the destinations itself if it
    /// ever returns.
    pub fn dispose(&mut self) -> Result<()> {
        let previous = self.state.set(GraphState::Disposed);
        if let Err(e) = self.source.stop() {
            warn!("Stopping source of {} failed: {}", self.name, e);
        }
        if let Some(Worker { handle, done }) = self.worker.take() {
            let deadline = Instant::now() + STOP_TIMEOUT;
            // fails when the render thread already ended with its source
            let _ = self.tx.send_deadline(Message::Shutdown, deadline);
            match done.recv_deadline(deadline) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if handle.join().is_err() {
                        error!("Render thread of {} panicked", self.name);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Render thread of {} did not stop within {:?}, detaching it",
                        self.name, STOP_TIMEOUT
                    );
                }
            }
        }
        if let Some((pipeline, _)) = self.pending.take() {
            pipeline.dispose_destinations();
        }
        if previous != GraphState::Disposed {
            info!("Render graph {} disposed", self.name);
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: Color) -> Result<()> {
        self.command(SourceEvent::SetColor(color))
    }

    pub fn set_palette(&mut self, palette: Vec<Color>) -> Result<()> {
        check_palette(&palette)?;
        self.command(SourceEvent::SetPalette(palette))
    }

    pub fn clear_color(&mut self) -> Result<()> {
        self.command(SourceEvent::ClearColor)
    }

    pub fn clear_palette(&mut self) -> Result<()> {
        self.command(SourceEvent::ClearPalette)
    }

    /// Blanks every destination.
    pub fn clear_display(&mut self) -> Result<()> {
        self.command(SourceEvent::Clear)
    }

    /// Before start the pipeline is still ours and applied directly;
    /// afterwards the render thread gets the event in order with frames.
    fn command(&mut self, event: SourceEvent) -> Result<()> {
        match self.state() {
            GraphState::Idle => {
                if let Some((pipeline, _)) = self.pending.as_mut() {
                    pipeline.handle(event);
                }
                Ok(())
            }
            GraphState::Disposed => Err(DmdError::InvalidState {
                action: "control the graph",
                state: GraphState::Disposed.as_str(),
            }),
            _ => self
                .tx
                .send_timeout(Message::Event(event), STOP_TIMEOUT)
                .map_err(|_| DmdError::ChannelClosed),
        }
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            error!("Disposing {} failed: {}", self.name, e);
        }
    }
}

struct Slot {
    destination: Arc<dyn Destination>,
    available: bool,
    conversion_failures: u32,
    routes: HashMap<FrameFormat, Option<Route>>,
}

impl Slot {
    fn new(destination: Arc<dyn Destination>) -> Self {
        Self {
            destination,
            available: true,
            conversion_failures: 0,
            routes: HashMap::new(),
        }
    }

    fn route(&mut self, format: FrameFormat) -> Option<Route> {
        if let Some(route) = self.routes.get(&format) {
            return *route;
        }
        let route = self.destination.capabilities().negotiate(format);
        match route {
            Some(route) => debug!("{}: {} frames go {:?}", self.destination.name(), format, route),
            None => warn!(
                "{}: no way to render {} frames, skipping them",
                self.destination.name(),
                format
            ),
        }
        self.routes.insert(format, route);
        route
    }

    /// Returns whether the destination rendered the frame.
    fn deliver(
        &mut self,
        frame: &DmdFrame,
        palette: Option<&Arc<[Color]>>,
        resize: ResizeMode,
    ) -> Result<bool> {
        let destination = self.destination.clone();
        let capabilities = destination.capabilities();
        let sized;
        let frame = match capabilities.fixed_size() {
            Some(dim) if dim != frame.dimensions() => {
                sized = transform::resize_frame(frame, dim, resize)?;
                &sized
            }
            _ => frame,
        };
        let Some(route) = self.route(frame.format()) else {
            return Ok(false);
        };
        match route.apply(frame, palette, capabilities)? {
            Payload::Frame(converted) => destination.render(&converted)?,
            Payload::Raw(data) => destination.render_raw(&data)?,
        }
        self.conversion_failures = 0;
        Ok(true)
    }

    fn fail(&mut self, graph: &str, error: DmdError, stats: &GraphStats) {
        stats.destination_error();
        metrics::counter!("destination_errors").increment(1);
        if error.is_conversion() {
            self.conversion_failures += 1;
            if self.conversion_failures < MAX_CONVERSION_FAILURES {
                debug!(
                    "{}: {} failed to convert a frame ({}/{}): {}",
                    graph,
                    self.destination.name(),
                    self.conversion_failures,
                    MAX_CONVERSION_FAILURES,
                    error
                );
                return;
            }
        }
        self.available = false;
        error!(
            "{}: {} is unavailable for the rest of the session: {}",
            graph,
            self.destination.name(),
            error
        );
    }
}

/// Everything the render thread owns.
struct Pipeline {
    name: String,
    processors: Vec<Box<dyn Processor>>,
    converter: Option<Arc<dyn Converter>>,
    colorization: Option<Colorization>,
    slots: Vec<Slot>,
    options: GraphOptions,
    color: Color,
    palette: Option<Vec<Color>>,
    /// Palette resolved per gray depth from `palette` or `color`.
    palettes: HashMap<BitDepth, Arc<[Color]>>,
    state: Arc<SharedState>,
    stats: Arc<GraphStats>,
    last_frame: Instant,
    idle_fired: bool,
}

impl Pipeline {
    fn run(mut self, rx: Receiver<Message>) {
        debug!("Render thread of {} running", self.name);
        self.last_frame = Instant::now();
        loop {
            let message = match self.idle_deadline() {
                Some(deadline) => rx.recv_deadline(deadline),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match message {
                Ok(Message::Event(SourceEvent::Ended(reason))) => {
                    warn!("Source of {} ended: {}", self.name, reason);
                    break;
                }
                Ok(Message::Event(event)) => self.handle(event),
                Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => self.on_idle(),
            }
        }
        self.state.set(GraphState::Disposed);
        self.dispose_destinations();
        debug!("Render thread of {} done", self.name);
    }

    fn idle_deadline(&self) -> Option<Instant> {
        let idle = self.options.idle.as_ref()?;
        (!self.idle_fired).then(|| self.last_frame + idle.timeout)
    }

    fn handle(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Frame(frame) => self.on_frame(frame),
            SourceEvent::Paused => {
                if self.state.transition(GraphState::Running, GraphState::Paused) {
                    info!("{} paused", self.name);
                }
            }
            SourceEvent::Resumed => {
                if self.state.transition(GraphState::Paused, GraphState::Running) {
                    info!("{} resumed", self.name);
                }
            }
            SourceEvent::Clear => self.for_each_destination("clear", |d| d.clear()),
            SourceEvent::SetColor(color) => {
                self.color = color;
                self.palettes.clear();
                if let Some(colorization) = &self.colorization {
                    colorization.switching.set_tint(color);
                }
                self.for_each_destination("set color", |d| d.set_color(color));
            }
            SourceEvent::SetPalette(palette) => {
                if let Err(e) = check_palette(&palette) {
                    warn!("{}: ignoring palette: {}", self.name, e);
                    return;
                }
                self.for_each_destination("set palette", |d| d.set_palette(&palette));
                self.palette = Some(palette);
                self.palettes.clear();
            }
            SourceEvent::ClearColor => {
                self.color = self.options.color;
                self.palettes.clear();
                if let Some(colorization) = &self.colorization {
                    colorization.switching.set_tint(self.color);
                }
                self.for_each_destination("clear color", |d| d.clear_color());
            }
            SourceEvent::ClearPalette => {
                self.palette = self.options.palette.clone();
                self.palettes.clear();
                self.for_each_destination("clear palette", |d| d.clear_palette());
            }
            SourceEvent::GameName(game) => self.load_colorization(game),
            SourceEvent::Ended(_) => {}
        }
    }

    fn on_frame(&mut self, frame: DmdFrame) {
        self.stats.received();
        metrics::counter!("frames_received").increment(1);
        if self.state.get() == GraphState::Paused {
            trace!("{} paused, dropping frame", self.name);
            self.stats.dropped();
            return;
        }
        self.last_frame = Instant::now();
        self.idle_fired = false;
        self.render(frame);
    }

    fn render(&mut self, frame: DmdFrame) {
        let started = Instant::now();
        match self.prepare(frame) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                self.stats.dropped();
                warn!("{}: dropping frame: {}", self.name, e);
            }
        }
        metrics::histogram!("dispatch_time_us").record(started.elapsed().as_micros() as f64);
    }

    /// Global pre-processing: resize, flips, processors, converter.
    fn prepare(&self, frame: DmdFrame) -> Result<DmdFrame> {
        let mut frame = match self.options.dimensions {
            Some(dim) => transform::resize_frame(&frame, dim, self.options.resize)?,
            None => frame,
        };
        frame = transform::flip_frame(&frame, self.options.flip_horizontal, self.options.flip_vertical)?;
        for processor in self.processors.iter().filter(|p| p.enabled()) {
            frame = processor.process(frame)?;
        }
        if let Some(converter) = &self.converter {
            if converter.accepts(frame.format()) {
                frame = converter.convert(&frame)?;
            }
        }
        Ok(frame)
    }

    /// The tint stage: gray frames get the graph palette for their depth,
    /// frames that carry colors don't.
    fn tint(&mut self, frame: &DmdFrame) -> Option<Arc<[Color]>> {
        let DmdFrame::Gray(gray) = frame else {
            return None;
        };
        let depth = gray.depth();
        if let Some(palette) = self.palettes.get(&depth) {
            return Some(palette.clone());
        }
        let colors: Arc<[Color]> = match &self.palette {
            Some(palette) => match fit_palette(palette, depth.num_colors()) {
                Ok(colors) => colors.into(),
                Err(e) => {
                    warn!("{}: cannot fit palette to {}: {}", self.name, depth, e);
                    return None;
                }
            },
            None => gradient(self.color, depth.num_colors()).into(),
        };
        self.palettes.insert(depth, colors.clone());
        Some(colors)
    }

    fn dispatch(&mut self, frame: &DmdFrame) {
        let palette = self.tint(frame);
        let resize = self.options.resize;
        for slot in self.slots.iter_mut().filter(|s| s.available) {
            match slot.deliver(frame, palette.as_ref(), resize) {
                Ok(true) => {
                    self.stats.dispatched();
                    metrics::counter!("frames_dispatched").increment(1);
                }
                Ok(false) => {
                    self.stats.skipped();
                    metrics::counter!("frames_skipped").increment(1);
                }
                Err(e) => slot.fail(&self.name, e, &self.stats),
            }
        }
    }

    fn for_each_destination(&mut self, action: &str, f: impl Fn(&dyn Destination) -> Result<()>) {
        for slot in self.slots.iter_mut().filter(|s| s.available) {
            if let Err(e) = f(slot.destination.as_ref()) {
                warn!("{}: {} failed on {}", self.name, action, slot.destination.name());
                slot.fail(&self.name, e, &self.stats);
            }
        }
    }

    fn on_idle(&mut self) {
        self.idle_fired = true;
        let image = self.options.idle.as_ref().and_then(|idle| idle.image.clone());
        match image {
            Some(image) => {
                info!("{} idle, showing idle image", self.name);
                self.render(image);
            }
            None => {
                info!("{} idle, clearing displays", self.name);
                self.for_each_destination("clear", |d| d.clear());
            }
        }
    }

    /// Resolves the game's colorization off the render thread; the swap
    /// lands between two frames.
    fn load_colorization(&self, game: String) {
        let Some(Colorization { switching, loader }) = self.colorization.clone() else {
            debug!("{}: game {} reported, no colorization configured", self.name, game);
            return;
        };
        let spawned = thread::Builder::new()
            .name("colorization-loader".into())
            .spawn(move || match loader.load(&game) {
                Ok(Some(converter)) => {
                    switching.switch(converter);
                }
                Ok(None) => {
                    info!("No colorization for {}", game);
                    switching.reset();
                }
                Err(e) => {
                    warn!("Cannot load colorization for {}: {}", game, e);
                    switching.reset();
                }
            });
        if let Err(e) = spawned {
            error!("{}: cannot spawn colorization loader: {}", self.name, e);
        }
    }

    fn dispose_destinations(&self) {
        for slot in &self.slots {
            if let Err(e) = slot.destination.dispose() {
                warn!("Disposing {} failed: {}", slot.destination.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PassthroughSource;
    use crate::display::VirtualDmd;

    fn graph() -> RenderGraph {
        let (source, _handle) = PassthroughSource::new("test");
        let (dmd, _view) = VirtualDmd::new("virtual", Color::RED);
        RenderGraph::builder("test")
            .source(source)
            .destination(Arc::new(dmd))
            .build()
            .unwrap()
    }

    #[test]
    fn lifecycle() {
        let mut graph = graph();
        assert_eq!(graph.state(), GraphState::Idle);
        graph.start().unwrap();
        assert_eq!(graph.state(), GraphState::Running);
        assert!(matches!(
            graph.start(),
            Err(DmdError::InvalidState { action: "start", state: "running" })
        ));
        graph.dispose().unwrap();
        assert_eq!(graph.state(), GraphState::Disposed);
        graph.dispose().unwrap();
        assert!(graph.start().is_err());
        assert!(graph.set_color(Color::BLUE).is_err());
    }

    #[test]
    fn dispose_from_idle_releases_destinations() {
        let (source, _handle) = PassthroughSource::new("test");
        let (dmd, view) = VirtualDmd::new("virtual", Color::RED);
        let mut graph = RenderGraph::builder("idle")
            .source(source)
            .destination(Arc::new(dmd))
            .build()
            .unwrap();
        graph.dispose().unwrap();
        assert!(view.is_disposed());
    }

    #[test]
    fn build_validates() {
        let (source, _handle) = PassthroughSource::new("test");
        assert!(RenderGraph::builder("empty").source(source).build().is_err());

        let (dmd, _view) = VirtualDmd::new("virtual", Color::RED);
        assert!(RenderGraph::builder("sourceless")
            .destination(Arc::new(dmd))
            .build()
            .is_err());

        let (source, _handle) = PassthroughSource::new("test");
        let (dmd, _view) = VirtualDmd::new("virtual", Color::RED);
        let options = GraphOptions {
            palette: Some(vec![Color::RED]),
            ..Default::default()
        };
        assert!(RenderGraph::builder("palette")
            .source(source)
            .destination(Arc::new(dmd))
            .options(options)
            .build()
            .is_err());
    }
}
