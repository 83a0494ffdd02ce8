// SPDX-License-Identifier: CEPL-1.0
use pacer_render::{FrameStatus, RenderError, RenderSize, RendererBackend, RendererConfig, Stage};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, info};

use crate::device::{detect_depth_format, select_and_create_device, DeviceRequirements, VulkanDevice};
use crate::error::{BackendError, BackendResult};
use crate::instance::{Surface, VulkanInstance};
use crate::orchestrator::FrameOrchestrator;
use crate::swapchain::SwapchainSettings;

/// The Vulkan implementation of [`RendererBackend`].
pub struct VulkanBackend {
    instance: VulkanInstance,
    surface: Surface,
    frames: Option<FrameOrchestrator<VulkanDevice>>,
}

fn platform_err(stage: Stage, e: impl std::fmt::Display) -> BackendError {
    BackendError::Platform {
        stage,
        message: e.to_string(),
    }
}

impl VulkanBackend {
    fn frames(&mut self) -> BackendResult<&mut FrameOrchestrator<VulkanDevice>> {
        self.frames
            .as_mut()
            .ok_or(BackendError::InvalidState("renderer already shut down"))
    }
}

/// Logs a fatal error with its stage before handing it to the caller.
fn report(op: &str, e: BackendError) -> RenderError {
    error!(stage = %e.stage(), "{op} failed: {e}");
    e.into()
}

impl RendererBackend for VulkanBackend {
    fn initialize(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RendererConfig,
    ) -> Result<Self, RenderError> {
        config.validate()?;

        let dh = display
            .display_handle()
            .map_err(|e| platform_err(Stage::Surface, e))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| platform_err(Stage::Surface, e))?
            .as_raw();

        // STRICT ORDER: instance -> surface -> device -> swapchain/frames.
        // Each failure unwinds what was built before it.
        let mut instance = VulkanInstance::create(dh, &config.app_name, config.validation)
            .map_err(|e| report("instance creation", e))?;

        let mut surface = match instance.create_surface(dh, wh) {
            Ok(s) => s,
            Err(e) => {
                instance.destroy();
                return Err(report("surface creation", e));
            }
        };

        let requirements = DeviceRequirements::from_config(config);
        let built = select_and_create_device(instance.raw(), &surface, &requirements)
            .and_then(|device| {
                let depth = detect_depth_format(&device, &config.depth_formats)?;
                info!("depth format: {depth:?}");
                let settings = SwapchainSettings::from_config(config, depth);
                // A failed orchestrator drops (and so destroys) the device.
                FrameOrchestrator::new(device, size, settings, config)
            });
        let frames = match built {
            Ok(f) => f,
            Err(e) => {
                surface.destroy();
                instance.destroy();
                return Err(report("renderer initialisation", e));
            }
        };

        info!("Vulkan backend initialised at {}x{}", size.width, size.height);
        Ok(Self {
            instance,
            surface,
            frames: Some(frames),
        })
    }

    fn on_resize(&mut self, size: RenderSize) {
        if let Some(frames) = self.frames.as_mut() {
            frames.on_resize(size);
        }
    }

    fn begin_frame(&mut self, _delta_time: f32) -> Result<FrameStatus, RenderError> {
        self.frames()
            .and_then(|f| f.begin_frame())
            .map_err(|e| report("begin_frame", e))
    }

    fn end_frame(&mut self, _delta_time: f32) -> Result<(), RenderError> {
        self.frames()
            .and_then(|f| f.end_frame())
            .map_err(|e| report("end_frame", e))
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        if let Some(frames) = self.frames.as_mut() {
            frames.set_clear_color(rgba);
        }
    }

    // STRICT TEARDOWN ORDER:
    // - device idle
    // - per-slot sync objects and command buffers
    // - framebuffers, renderpass, swapchain (views, depth)
    // - command pool and device
    // - surface, debug messenger, instance last
    fn shutdown(&mut self) {
        let Some(mut frames) = self.frames.take() else {
            return;
        };
        info!("shutting down Vulkan backend");
        frames.destroy();
        frames.gpu_mut().destroy();
        drop(frames);
        self.surface.destroy();
        self.instance.destroy();
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
