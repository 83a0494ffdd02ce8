// SPDX-License-Identifier: CEPL-1.0
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod config;
pub mod error;
pub mod frontend;

pub use config::{BackendKind, DepthFormat, PresentModePreference, RendererConfig};
pub use error::{RenderError, Stage};
pub use frontend::{RenderPacket, RendererFrontend};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero-sized framebuffer.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Outcome of `begin_frame` that is not a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// A command buffer is recording; draw, then call `end_frame`.
    Ready,
    /// Skip drawing this iteration (recreation, zero-sized target, timeout).
    NotReady,
}

/// Contract every graphics backend implements. The frontend and the
/// application only ever talk to this trait.
pub trait RendererBackend {
    fn initialize(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RendererConfig,
    ) -> Result<Self, RenderError>
    where
        Self: Sized;

    /// Records a new framebuffer size. Must not touch GPU objects; the
    /// backend applies it at its next safe point.
    fn on_resize(&mut self, size: RenderSize);

    fn begin_frame(&mut self, delta_time: f32) -> Result<FrameStatus, RenderError>;

    /// Only valid after `begin_frame` returned [`FrameStatus::Ready`].
    fn end_frame(&mut self, delta_time: f32) -> Result<(), RenderError>;

    fn set_clear_color(&mut self, _rgba: [f32; 4]) {}

    /// Waits for the GPU and releases every backend resource. Idempotent.
    fn shutdown(&mut self);
}
