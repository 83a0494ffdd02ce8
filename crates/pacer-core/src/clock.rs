// SPDX-License-Identifier: CEPL-1.0
//! Wall-clock frame timing for the application loop.

use std::time::{Duration, Instant};

/// Upper bound on a single frame's delta. A debugger pause or a long
/// minimise should not turn into one giant simulation step.
const MAX_DELTA: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last: Option<Instant>,
    frames: u64,
    window_start: Instant,
    window_frames: u32,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: None,
            frames: 0,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Seconds elapsed since the previous tick; the first tick yields 0.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(prev) => now.saturating_duration_since(prev).min(MAX_DELTA),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        dt.as_secs_f32()
    }

    /// Marks a frame as actually drawn.
    pub fn frame_drawn(&mut self) {
        self.frames = self.frames.saturating_add(1);
        self.window_frames = self.window_frames.saturating_add(1);
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    /// Wall time since the clock was created, pauses included.
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// Returns the frame count of the last full second, once per second.
    pub fn poll_fps(&mut self) -> Option<u32> {
        self.poll_fps_at(Instant::now())
    }

    fn poll_fps_at(&mut self, now: Instant) -> Option<u32> {
        if now.saturating_duration_since(self.window_start) < Duration::from_secs(1) {
            return None;
        }
        let fps = self.window_frames;
        self.window_frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Forgets the previous tick, e.g. after the window was minimised.
    pub fn pause(&mut self) {
        self.last = None;
        self.window_frames = 0;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick_at(Instant::now()), 0.0);
    }

    #[test]
    fn test_tick_measures_delta_between_calls() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let dt = clock.tick_at(t0 + Duration::from_millis(16));
        assert!((dt - 0.016).abs() < 1e-4);
    }

    #[test]
    fn test_long_stalls_are_clamped() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let dt = clock.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(dt, MAX_DELTA.as_secs_f32());
    }

    #[test]
    fn test_pause_resets_the_delta() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        clock.pause();
        assert_eq!(clock.tick_at(t0 + Duration::from_millis(100)), 0.0);
    }

    #[test]
    fn test_fps_reported_once_per_second() {
        let mut clock = FrameClock::new();
        let t0 = clock.window_start;
        for _ in 0..3 {
            clock.frame_drawn();
        }
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(500)), None);
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(1000)), Some(3));
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(1100)), None);
        assert_eq!(clock.frames_drawn(), 3);
    }

    #[test]
    fn test_run_totals_survive_pause_and_fps_polls() {
        let mut clock = FrameClock::new();
        let t0 = clock.start;
        clock.frame_drawn();
        clock.frame_drawn();
        clock.pause();
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_secs(1)), Some(0));
        assert_eq!(clock.frames_drawn(), 2);
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(clock.elapsed_at(t0), Duration::ZERO);
    }
}
