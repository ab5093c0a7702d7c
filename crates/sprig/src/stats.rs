//! Per-frame render counters.
//!
//! One [`RenderStats`] is shared (via `Rc`) by the batches and surfaces of a
//! context. Counters are `Cell`s so that batches can bump them from `&self`
//! paths without threading `&mut` through the draw API.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RenderStats {
    flushes: Cell<u32>,
    draw_calls: Cell<u32>,
    quads: Cell<u32>,
    texture_switches: Cell<u32>,
    clips: Cell<u32>,
    frames: Cell<u64>,
}

/// Plain copy of the counters, also the `stats` object on the telemetry wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub flushes: u32,
    pub draw_calls: u32,
    pub quads: u32,
    pub texture_switches: u32,
    pub clips: u32,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flush that may or may not have had work.
    pub fn record_flush(&self) {
        bump(&self.flushes, 1);
    }

    /// One indexed draw covering `quads` quads.
    pub fn record_draw(&self, quads: u32) {
        bump(&self.draw_calls, 1);
        bump(&self.quads, quads);
    }

    pub fn record_texture_switch(&self) {
        bump(&self.texture_switches, 1);
    }

    pub fn record_clip(&self) {
        bump(&self.clips, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            flushes: self.flushes.get(),
            draw_calls: self.draw_calls.get(),
            quads: self.quads.get(),
            texture_switches: self.texture_switches.get(),
            clips: self.clips.get(),
        }
    }

    /// Returns the finished frame's counters and zeroes them.
    pub fn reset_frame(&self) -> StatsSnapshot {
        let snap = self.snapshot();
        self.flushes.set(0);
        self.draw_calls.set(0);
        self.quads.set(0);
        self.texture_switches.set(0);
        self.clips.set(0);
        bump64(&self.frames);
        snap
    }

    /// Number of completed frames (calls to [`reset_frame`](Self::reset_frame)).
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }
}

fn bump(cell: &Cell<u32>, by: u32) {
    cell.set(cell.get().saturating_add(by));
}

fn bump64(cell: &Cell<u64>) {
    cell.set(cell.get() + 1);
}
