// SPDX-License-Identifier: CEPL-1.0
//! Main renderpass (one color + one depth attachment) and the per-image
//! framebuffers that bind the swapchain targets to it.

use ash::vk;
use pacer_render::{RendererConfig, Stage};
use tracing::debug;

use crate::command_buffer::{CommandBuffer, CommandBufferState};
use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::Gpu;

#[derive(Debug)]
pub struct Renderpass {
    handle: vk::RenderPass,
    area: vk::Rect2D,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u32,
}

impl Renderpass {
    pub fn create<G: Gpu + ?Sized>(
        gpu: &G,
        color_format: vk::Format,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        cfg: &RendererConfig,
    ) -> BackendResult<Self> {
        let handle = gpu
            .create_render_pass(color_format, depth_format)
            .at(Stage::Swapchain)?;
        debug!(?color_format, ?depth_format, "renderpass created");
        Ok(Self {
            handle,
            area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_color: cfg.clear_color,
            clear_depth: cfg.clear_depth,
            clear_stencil: cfg.clear_stencil,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn area(&self) -> vk::Rect2D {
        self.area
    }

    /// Only the size tracks the framebuffer; the offset stays put.
    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.area.extent = extent;
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: self.clear_stencil,
                },
            },
        ]
    }

    pub fn begin<G: Gpu + ?Sized>(
        &self,
        gpu: &G,
        cmd: &mut CommandBuffer,
        framebuffer: &Framebuffer,
    ) -> BackendResult<()> {
        if cmd.state() != CommandBufferState::Recording {
            return Err(BackendError::InvalidState(
                "renderpass begin needs a recording command buffer",
            ));
        }
        gpu.cmd_begin_render_pass(
            cmd.handle(),
            self.handle,
            framebuffer.handle,
            self.area,
            &self.clear_values(),
        );
        cmd.set_state(CommandBufferState::InRenderPass);
        Ok(())
    }

    pub fn end<G: Gpu + ?Sized>(&self, gpu: &G, cmd: &mut CommandBuffer) -> BackendResult<()> {
        if cmd.state() != CommandBufferState::InRenderPass {
            return Err(BackendError::InvalidState("no renderpass is open"));
        }
        gpu.cmd_end_render_pass(cmd.handle());
        cmd.set_state(CommandBufferState::Recording);
        Ok(())
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if self.handle != vk::RenderPass::null() {
            gpu.destroy_render_pass(self.handle);
            self.handle = vk::RenderPass::null();
        }
    }
}

/// EXTERNAL -> subpass 0.
///
/// Every frame slot clears the same depth image, so the clear must wait for
/// the previous submission's depth writes as well as for the acquired color
/// image.
pub fn external_dependency() -> vk::SubpassDependency {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(attachment_stages)
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(attachment_stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

#[derive(Debug)]
pub struct Framebuffer {
    handle: vk::Framebuffer,
}

impl Framebuffer {
    pub fn create<G: Gpu + ?Sized>(
        gpu: &G,
        renderpass: &Renderpass,
        extent: vk::Extent2D,
        attachments: &[vk::ImageView],
    ) -> BackendResult<Self> {
        let handle = gpu
            .create_framebuffer(renderpass.handle(), attachments, extent)
            .at(Stage::Swapchain)?;
        Ok(Self { handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn destroy<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if self.handle != vk::Framebuffer::null() {
            gpu.destroy_framebuffer(self.handle);
            self.handle = vk::Framebuffer::null();
        }
    }
}
