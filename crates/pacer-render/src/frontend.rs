// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame driver used by the application loop.

use tracing::error;

use crate::{FrameStatus, RenderError, RenderSize, RendererBackend};

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderPacket {
    pub delta_time: f32,
}

pub struct RendererFrontend {
    backend: Box<dyn RendererBackend>,
    frame_number: u64,
    shut_down: bool,
}

impl RendererFrontend {
    pub fn new(backend: Box<dyn RendererBackend>) -> Self {
        Self {
            backend,
            frame_number: 0,
            shut_down: false,
        }
    }

    /// Number of frames that went through `end_frame`.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn on_resize(&mut self, size: RenderSize) {
        self.backend.on_resize(size);
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.backend.set_clear_color(rgba);
    }

    /// Runs one begin/end pair. Returns `Ok(false)` when the backend asked
    /// to skip this iteration; any error is fatal for the run loop.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> Result<bool, RenderError> {
        let status = self.backend.begin_frame(packet.delta_time).map_err(|e| {
            error!("begin_frame failed: {e}");
            e
        })?;
        if status == FrameStatus::NotReady {
            return Ok(false);
        }

        let result = self.backend.end_frame(packet.delta_time);
        self.frame_number += 1;
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("end_frame failed: {e}. Application shutting down...");
                Err(e)
            }
        }
    }

    pub fn shutdown(&mut self) {
        if !self.shut_down {
            self.backend.shutdown();
            self.shut_down = true;
        }
    }
}

impl Drop for RendererFrontend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
