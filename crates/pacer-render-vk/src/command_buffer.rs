// SPDX-License-Identifier: CEPL-1.0
//! Command buffers allocated from the device's graphics pool, with their
//! recording state tracked on the CPU side.

use ash::vk;
use pacer_render::Stage;

use crate::error::{BackendError, BackendResult, VkResultExt};
use crate::gpu::{Gpu, QueueRole, Submission};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    NotAllocated,
    Ready,
    Recording,
    InRenderPass,
    RecordingEnded,
    Submitted,
}

#[derive(Debug)]
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    pub fn allocate<G: Gpu + ?Sized>(gpu: &G, primary: bool) -> BackendResult<Self> {
        let handle = gpu.allocate_command_buffer(primary).at(Stage::Command)?;
        Ok(Self {
            handle,
            state: CommandBufferState::Ready,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: CommandBufferState) {
        self.state = state;
    }

    pub fn free<G: Gpu + ?Sized>(&mut self, gpu: &G) {
        if self.state != CommandBufferState::NotAllocated {
            gpu.free_command_buffer(self.handle);
            self.handle = vk::CommandBuffer::null();
            self.state = CommandBufferState::NotAllocated;
        }
    }

    pub fn begin<G: Gpu + ?Sized>(
        &mut self,
        gpu: &G,
        usage: vk::CommandBufferUsageFlags,
    ) -> BackendResult<()> {
        if self.state != CommandBufferState::Ready {
            return Err(BackendError::InvalidState(
                "command buffer must be ready before recording begins",
            ));
        }
        gpu.begin_command_buffer(self.handle, usage)
            .at(Stage::Command)?;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    pub fn end<G: Gpu + ?Sized>(&mut self, gpu: &G) -> BackendResult<()> {
        if self.state != CommandBufferState::Recording {
            return Err(BackendError::InvalidState(
                "command buffer must be recording outside a render pass to end",
            ));
        }
        gpu.end_command_buffer(self.handle).at(Stage::Command)?;
        self.state = CommandBufferState::RecordingEnded;
        Ok(())
    }

    pub fn update_submitted(&mut self) {
        self.state = CommandBufferState::Submitted;
    }

    /// Clears recorded commands so the buffer can be begun again.
    pub fn reset<G: Gpu + ?Sized>(&mut self, gpu: &G) -> BackendResult<()> {
        if self.state == CommandBufferState::NotAllocated {
            return Err(BackendError::InvalidState("resetting a freed command buffer"));
        }
        gpu.reset_command_buffer(self.handle).at(Stage::Command)?;
        self.state = CommandBufferState::Ready;
        Ok(())
    }

    /// Allocates a primary buffer and begins it for one-time submission.
    pub fn allocate_and_begin_single_use<G: Gpu + ?Sized>(gpu: &G) -> BackendResult<Self> {
        let mut cmd = Self::allocate(gpu, true)?;
        if let Err(e) = cmd.begin(gpu, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT) {
            cmd.free(gpu);
            return Err(e);
        }
        Ok(cmd)
    }

    /// Ends, submits, waits for the queue to drain, then frees.
    ///
    /// Buffers come from the graphics-family pool, so they are only ever
    /// submitted to the graphics queue.
    pub fn end_single_use<G: Gpu + ?Sized>(mut self, gpu: &G) -> BackendResult<()> {
        let result = self.submit_and_drain(gpu);
        self.free(gpu);
        result
    }

    fn submit_and_drain<G: Gpu + ?Sized>(&mut self, gpu: &G) -> BackendResult<()> {
        self.end(gpu)?;
        let handles = [self.handle];
        let submission = Submission {
            command_buffers: &handles,
            wait: None,
            signal: None,
            fence: vk::Fence::null(),
        };
        gpu.queue_submit(QueueRole::Graphics, &submission)
            .at(Stage::Submit)?;
        self.update_submitted();
        gpu.queue_wait_idle(QueueRole::Graphics).at(Stage::Submit)
    }
}
