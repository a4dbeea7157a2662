#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use dmdgraph::capability::{Capabilities, FrameKinds};
use dmdgraph::display::Destination;
use dmdgraph::error::{DmdError, Result};
use dmdgraph::frame::{Color, DmdFrame};

/// Keeps every frame it is given.
pub struct Recorder {
    pub name: String,
    pub capabilities: Capabilities,
    pub frames: Mutex<Vec<DmdFrame>>,
    pub clears: Mutex<u32>,
    pub colors: Mutex<Vec<Color>>,
    pub failing: bool,
}

impl Recorder {
    pub fn new(name: &str, kinds: FrameKinds) -> Arc<Self> {
        Self::with_capabilities(name, Capabilities::new(kinds))
    }

    pub fn with_capabilities(name: &str, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capabilities,
            frames: Mutex::new(Vec::new()),
            clears: Mutex::new(0),
            colors: Mutex::new(Vec::new()),
            failing: false,
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Arc::into_inner(Self::new(name, FrameKinds::ALL_GRAY)).unwrap()
        })
    }

    pub fn frames(&self) -> Vec<DmdFrame> {
        self.frames.lock().clone()
    }
}

impl Destination for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn render(&self, frame: &DmdFrame) -> Result<()> {
        if self.failing {
            return Err(DmdError::Device {
                name: self.name.clone(),
                reason: "unplugged".into(),
            });
        }
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    fn set_color(&self, color: Color) -> Result<()> {
        self.colors.lock().push(color);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.clears.lock() += 1;
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

/// Polls until `done` holds, failing after five seconds.
pub fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(10));
    }
}
