// SPDX-License-Identifier: CEPL-1.0
//! Window creation and the framebuffer-size cache the run loop polls.
#![deny(unsafe_op_in_unsafe_fn)]
pub use winit;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event_loop::ActiveEventLoop,
    window::{Window, WindowAttributes},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Top-left corner in physical pixels; `None` lets the OS place it.
    pub position: Option<[i32; 2]>,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "pacer".to_owned(),
            position: None,
            width: 1280,
            height: 720,
        }
    }
}

impl WindowConfig {
    pub fn attributes(&self) -> WindowAttributes {
        let mut attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(LogicalSize::new(
                self.width.max(1) as f64,
                self.height.max(1) as f64,
            ));
        if let Some([x, y]) = self.position {
            attrs = attrs.with_position(PhysicalPosition::new(x, y));
        }
        attrs
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, cfg: &WindowConfig) -> Result<Window> {
    let window = event_loop
        .create_window(cfg.attributes())
        .with_context(|| format!("creating window {:?}", cfg.title))?;
    let size = window.inner_size();
    info!(
        "window {:?} created ({}x{} physical)",
        cfg.title, size.width, size.height
    );
    Ok(window)
}

/// Latest framebuffer size reported by the OS.
///
/// The size is cached until the run loop takes it, after which the cache
/// reads as stale until the next resize arrives.
#[derive(Clone, Copy, Debug)]
pub struct FramebufferSize {
    width: u32,
    height: u32,
    stale: bool,
    minimized: bool,
}

impl Default for FramebufferSize {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl FramebufferSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stale: true,
            minimized: width == 0 || height == 0,
        }
    }

    pub fn record(&mut self, width: u32, height: u32) {
        if !self.stale && (self.width, self.height) == (width, height) {
            return;
        }
        debug!("framebuffer resized to {width}x{height}");
        self.width = width;
        self.height = height;
        self.minimized = width == 0 || height == 0;
        self.stale = false;
    }

    /// Hands out a size recorded since the last call, at most once.
    pub fn take(&mut self) -> Option<(u32, u32)> {
        if self.stale {
            return None;
        }
        self.stale = true;
        Some((self.width, self.height))
    }

    /// Whether the last known size has no area. Unaffected by `take`.
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn last(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_size_is_not_reported_as_a_resize() {
        let mut fb = FramebufferSize::new(800, 600);
        assert_eq!(fb.take(), None);
        assert_eq!(fb.last(), (800, 600));
        assert!(!fb.is_minimized());
    }

    #[test]
    fn test_resize_is_taken_once() {
        let mut fb = FramebufferSize::new(800, 600);
        fb.record(1024, 768);
        assert_eq!(fb.take(), Some((1024, 768)));
        assert_eq!(fb.take(), None);
    }

    #[test]
    fn test_later_resize_overwrites_earlier() {
        let mut fb = FramebufferSize::new(800, 600);
        fb.record(640, 480);
        fb.record(320, 240);
        assert_eq!(fb.take(), Some((320, 240)));
    }

    #[test]
    fn test_zero_area_marks_minimized_until_restored() {
        let mut fb = FramebufferSize::new(800, 600);
        fb.record(0, 0);
        assert!(fb.is_minimized());
        assert_eq!(fb.take(), Some((0, 0)));
        assert!(fb.is_minimized());
        fb.record(800, 600);
        assert!(!fb.is_minimized());
        assert_eq!(fb.take(), Some((800, 600)));
    }

    #[test]
    fn test_window_config_fills_missing_fields() {
        let cfg: WindowConfig = toml::from_str("title = \"demo\"\nposition = [10, 20]").unwrap();
        assert_eq!(cfg.title, "demo");
        assert_eq!(cfg.position, Some([10, 20]));
        assert_eq!((cfg.width, cfg.height), (1280, 720));
    }
}
