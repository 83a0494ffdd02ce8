// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device selection, swapchain management and frame pacing
//! on top of `ash`.

mod backend;
pub mod command_buffer;
pub mod device;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod image;
pub mod instance;
pub mod orchestrator;
pub mod renderpass;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
mod mock;

pub use backend::VulkanBackend;
pub use error::{BackendError, BackendResult};
pub use gpu::Gpu;
pub use orchestrator::{FrameOrchestrator, FramePhase};
