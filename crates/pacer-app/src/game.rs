// SPDX-License-Identifier: CEPL-1.0
//! Callbacks the run loop drives each frame.

use tracing::{debug, info, trace};

/// A `false` return from any callback is fatal and ends the run.
pub trait Game {
    fn initialize(&mut self) -> bool;

    fn update(&mut self, delta_time: f32) -> bool;

    fn render(&mut self, delta_time: f32) -> bool;

    fn on_resize(&mut self, width: u32, height: u32);

    /// Clear color for the next frame, if the game wants to change it.
    fn clear_color(&self) -> Option<[f32; 4]> {
        None
    }
}

/// Slowly cycles the clear color so presentation is visible on screen.
#[derive(Debug, Default)]
pub struct Testbed {
    elapsed: f32,
    size: (u32, u32),
    frames: u64,
}

const CYCLE_SECONDS: f32 = 8.0;

impl Game for Testbed {
    fn initialize(&mut self) -> bool {
        info!("testbed initialised");
        true
    }

    fn update(&mut self, delta_time: f32) -> bool {
        self.elapsed = (self.elapsed + delta_time) % CYCLE_SECONDS;
        true
    }

    fn render(&mut self, _delta_time: f32) -> bool {
        self.frames += 1;
        trace!(frame = self.frames, "testbed render at {}x{}", self.size.0, self.size.1);
        true
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        debug!("testbed resized to {width}x{height}");
        self.size = (width, height);
    }

    fn clear_color(&self) -> Option<[f32; 4]> {
        let phase = self.elapsed / CYCLE_SECONDS * std::f32::consts::TAU;
        let wave = |offset: f32| 0.05 + 0.1 * (0.5 + 0.5 * (phase + offset).sin());
        Some([wave(0.0), wave(2.1), wave(4.2), 1.0])
    }
}
