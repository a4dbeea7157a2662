//! Per-graph frame counters

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Counters updated by the render thread and read from anywhere
#[derive(Default)]
pub struct GraphStats {
    counters: CachePadded<Counters>,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_dispatched: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    destination_errors: AtomicU64,
}

/// Point-in-time copy of [`GraphStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames the source emitted
    pub frames_received: u64,
    /// Frames a destination rendered, counted once per destination
    pub frames_dispatched: u64,
    /// Frames discarded while paused or because pre-processing failed
    pub frames_dropped: u64,
    /// Frames a destination had no route for
    pub frames_skipped: u64,
    pub destination_errors: u64,
}

impl GraphStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn received(&self) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatched(&self) {
        self.counters.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skipped(&self) {
        self.counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn destination_error(&self) {
        self.counters.destination_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_dispatched: self.counters.frames_dispatched.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.counters.frames_skipped.load(Ordering::Relaxed),
            destination_errors: self.counters.destination_errors.load(Ordering::Relaxed),
        }
    }
}
